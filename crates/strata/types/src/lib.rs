//! STRATA Types - Core types for stack deployments
//!
//! STRATA is a deployment toolkit for CloudFormation-style infrastructure
//! stacks. This crate holds the data model shared by the hotswap engine
//! and the environment layer.
//!
//! ## Architectural Boundaries
//!
//! - **strata-types** owns: the template model, the structural-diff model,
//!   change-classification records, property overrides, progress events
//! - **strata-cloud** owns: control-plane access and template evaluation
//! - **strata-hotswap** owns: classification, planning, and execution
//!
//! ## Key Concepts
//!
//! - **Template**: a declarative stack document (resources + outputs)
//! - **TemplateDiff**: the structural difference between two templates
//! - **RejectedChange**: a change the hotswap engine refuses, with reason
//! - **AffectedResource**: a physical resource touched by an operation
//! - **Events**: unified observability stream for hotswap progress

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod change;
pub mod diff;
pub mod events;
pub mod ids;
pub mod overrides;
pub mod template;

// Re-export main types
pub use change::{
    AffectedResource, HotswapMode, NonHotswappableReason, RejectedChange, RejectionSubject,
};
pub use diff::{OutputDifference, PropertyDifference, ResourceDifference, TemplateDiff};
pub use events::{EventSeverity, EventSource, HotswapEvent, HotswapEventEnvelope};
pub use ids::{resource_types, LogicalId, ResourceType};
pub use overrides::{EcsHotswapProperties, HotswapPropertyOverrides, OverrideValidationError};
pub use template::{NestedStackTemplates, ResourceDefinition, Template};
