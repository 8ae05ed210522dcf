//! Change-classification records
//!
//! The hotswap engine partitions every template change into hotswappable
//! operations (built by the plan builder, owned here only descriptively)
//! and rejected changes. Rejections are pure data: reason, human-readable
//! description, and the subject they apply to.

use crate::ids::{LogicalId, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Hotswap dispatch mode requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HotswapMode {
    /// Abort the hotswap entirely (fall back to a full deployment) if any
    /// change is non-hotswappable
    FallBack,

    /// Apply whatever is hotswappable and report the rest as skipped
    HotswapOnly,
}

impl fmt::Display for HotswapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotswapMode::FallBack => write!(f, "fall-back"),
            HotswapMode::HotswapOnly => write!(f, "hotswap-only"),
        }
    }
}

/// Why a change could not be hotswapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonHotswappableReason {
    /// The only offending property is `Tags`
    Tags,
    /// One or more changed properties are outside the type's allow-list
    Properties,
    /// Stack outputs never hotswap
    Output,
    /// A resource depending on the changed one cannot be updated in place
    DependencyUnsupported,
    /// No detector supports this resource type
    ResourceUnsupported,
    /// The resource is created by this deployment
    ResourceCreation,
    /// The resource is destroyed by this deployment
    ResourceDeletion,
    /// The resource's type tag changed
    ResourceTypeChanged,
    /// A nested stack is created by this deployment
    NestedStackCreation,
}

/// What a rejection applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionSubject {
    /// A resource-level change
    Resource {
        logical_id: LogicalId,
        resource_type: ResourceType,
        /// Property names that blocked the hotswap
        rejected_properties: Vec<String>,
        /// Construct path recorded by the synthesizer, for diagnostics
        construct_path: Option<String>,
    },

    /// A stack-output change
    Output { output_id: String },
}

/// A change the hotswap engine refused to apply in place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedChange {
    pub reason: NonHotswappableReason,
    pub description: String,
    pub subject: RejectionSubject,
    /// Whether hotswap-only-mode reporting shows this rejection. Internal
    /// bookkeeping rejections (kept for fall-back mode) set this to false.
    pub visible_in_hotswap_only_mode: bool,
}

impl RejectedChange {
    /// A resource-level rejection, visible in every mode
    pub fn resource(
        reason: NonHotswappableReason,
        description: impl Into<String>,
        logical_id: LogicalId,
        resource_type: ResourceType,
        rejected_properties: Vec<String>,
    ) -> Self {
        Self {
            reason,
            description: description.into(),
            subject: RejectionSubject::Resource {
                logical_id,
                resource_type,
                rejected_properties,
                construct_path: None,
            },
            visible_in_hotswap_only_mode: true,
        }
    }

    /// An output-level rejection
    pub fn output(output_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            reason: NonHotswappableReason::Output,
            description: description.into(),
            subject: RejectionSubject::Output {
                output_id: output_id.into(),
            },
            visible_in_hotswap_only_mode: true,
        }
    }

    /// Hide this rejection from hotswap-only-mode reporting
    pub fn hidden(mut self) -> Self {
        self.visible_in_hotswap_only_mode = false;
        self
    }

    /// Attach the synthesizer construct path for diagnostics
    pub fn with_construct_path(mut self, path: Option<String>) -> Self {
        if let RejectionSubject::Resource { construct_path, .. } = &mut self.subject {
            *construct_path = path;
        }
        self
    }
}

/// Descriptive record of a physical resource touched by an operation.
/// Used only for reporting; carries no behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedResource {
    pub logical_id: LogicalId,
    pub resource_type: ResourceType,
    pub physical_name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

impl AffectedResource {
    pub fn new(logical_id: LogicalId, resource_type: ResourceType) -> Self {
        Self {
            logical_id,
            resource_type,
            physical_name: None,
            description: None,
            metadata: None,
        }
    }

    pub fn with_physical_name(mut self, name: impl Into<String>) -> Self {
        self.physical_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::resource_types;

    #[test]
    fn test_hidden_rejection_keeps_reason() {
        let rejected = RejectedChange::resource(
            NonHotswappableReason::DependencyUnsupported,
            "no services reference this task definition",
            LogicalId::new("TaskDef"),
            ResourceType::new(resource_types::ECS_TASK_DEFINITION),
            vec![],
        )
        .hidden();

        assert_eq!(rejected.reason, NonHotswappableReason::DependencyUnsupported);
        assert!(!rejected.visible_in_hotswap_only_mode);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(HotswapMode::FallBack.to_string(), "fall-back");
        assert_eq!(HotswapMode::HotswapOnly.to_string(), "hotswap-only");
    }
}
