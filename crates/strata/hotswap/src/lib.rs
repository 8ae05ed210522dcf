//! STRATA Hotswap Engine
//!
//! Given the currently-deployed and the desired version of a stack
//! template, decides which resource changes can be applied directly
//! against live resources (bypassing the full deployment orchestrator),
//! applies that subset with bounded concurrency, and explains the rest.
//!
//! ## Architectural Boundaries
//!
//! - `strata-hotswap` owns: change classification, the per-resource-type
//!   detector registry, plan building, bounded execution, reporting
//! - `strata-cloud` owns: typed control-plane operations and template
//!   evaluation (called BY this crate, never reimplemented here)
//! - The full deployment/rollback orchestration is the caller; this crate
//!   only answers "what can hotswap, what cannot, and why"
//!
//! ## Key Principle
//!
//! Classification errors are data: every change maps to exactly one
//! hotswappable operation or rejection, so the caller always gets a
//! complete, explainable plan. Execution errors are errors: failures
//! during an operation's apply step propagate after all in-flight
//! operations have settled.
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use strata_cloud::{InMemoryControlPlane, TemplateEvaluator};
//! use strata_hotswap::{HotswapEngine, HotswapResult};
//! use strata_types::{HotswapMode, HotswapPropertyOverrides, Template};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let control = Arc::new(InMemoryControlPlane::new());
//! let deployed = Template::default();
//! let desired = Template::default();
//! let evaluator = Arc::new(TemplateEvaluator::new(
//!     "web-stack",
//!     desired.clone(),
//!     control.clone(),
//! ));
//!
//! let engine = HotswapEngine::new(control);
//! let result = engine
//!     .try_hotswap(
//!         HotswapMode::FallBack,
//!         &deployed,
//!         &desired,
//!         &BTreeMap::new(),
//!         evaluator,
//!         &HotswapPropertyOverrides::default(),
//!     )
//!     .await?;
//!
//! match result {
//!     HotswapResult::FallBack { .. } => { /* run a full deployment */ }
//!     HotswapResult::Applied { .. } => { /* done */ }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod builder;
pub mod classify;
pub mod detectors;
pub mod diff;
pub mod engine;
pub mod error;
pub mod executor;
pub mod plan;
pub mod report;

// Re-exports
pub use builder::classify_template_diff;
pub use detectors::{ChangeDetector, DetectorRegistry};
pub use diff::{StructuralTemplateDiffer, TemplateDiffer};
pub use engine::{HotswapEngine, HotswapResult};
pub use error::{HotswapError, Result};
pub use executor::HotswapExecutor;
pub use plan::{AppliedOperation, ClassifiedChange, HotswapOperation, HotswapPlan};
