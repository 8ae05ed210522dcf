//! STRATA Cloud - Environment boundary for stack deployments
//!
//! Everything that crosses into the live environment goes through this
//! crate: typed control-plane operations (update a function, register a
//! task-definition revision, wait for a service to stabilize) and template
//! evaluation against the currently-deployed stack (physical names,
//! reverse references, intrinsic expressions).
//!
//! ## Architectural Boundaries
//!
//! - `strata-cloud` owns: the `ControlPlane` trait and its in-memory
//!   implementation, the `StackEvaluator` trait and `TemplateEvaluator`
//! - `strata-hotswap` owns: classification and execution, calling through
//!   these interfaces only
//!
//! Production deployments plug a provider-SDK-backed `ControlPlane` in;
//! the in-memory implementation serves development and tests.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod control;
pub mod error;
pub mod eval;
pub mod memory;

// Re-exports
pub use control::{
    BuildProjectUpdate, ControlPlane, FunctionCodeUpdate, FunctionConfigurationUpdate,
    ServiceUpdate,
};
pub use error::{CloudError, Result};
pub use eval::{ResourceReference, StackEvaluator, TemplateEvaluator};
pub use memory::{ApiCall, InMemoryControlPlane};
