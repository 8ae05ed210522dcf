//! Per-resource-type hotswap detectors
//!
//! Each detector knows which property names are safe to change in place
//! for its resource type and how to build the apply operation. Dispatch is
//! a closed registry keyed by type tag; adding a resource kind means
//! adding one implementation, never modifying the dispatch core.
//!
//! The allow-lists encode which provider APIs support in-place mutation.
//! That is an external domain fact this crate cannot verify, only encode:
//! treat them as configuration data when extending.

pub mod appsync;
pub mod bucket_deployment;
pub mod build_project;
pub mod function;
pub mod iam_policy;
pub mod state_machine;
pub mod task_definition;

pub use appsync::AppSyncDetector;
pub use bucket_deployment::BucketDeploymentDetector;
pub use build_project::BuildProjectDetector;
pub use function::FunctionDetector;
pub use iam_policy::IamPolicyDetector;
pub use state_machine::StateMachineDetector;
pub use task_definition::TaskDefinitionDetector;

use crate::error::Result;
use crate::plan::ClassifiedChange;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_cloud::{ControlPlane, StackEvaluator};
use strata_types::{
    resource_types, HotswapPropertyOverrides, LogicalId, NonHotswappableReason, PropertyDifference,
    RejectedChange, ResourceDifference, ResourceType,
};

/// Type-specific hotswap detection.
///
/// Candidates routed here always have both sides present with an unchanged
/// resource type; the structural classifier has already rejected the rest.
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    /// Diagnostic tag identifying the service being hotswapped
    fn service(&self) -> &'static str;

    /// Classify one candidate change; returns zero or more verdicts
    async fn detect(
        &self,
        logical_id: &LogicalId,
        change: &ResourceDifference,
        evaluator: &Arc<dyn StackEvaluator>,
        control: &Arc<dyn ControlPlane>,
        overrides: &HotswapPropertyOverrides,
    ) -> Result<Vec<ClassifiedChange>>;
}

/// Registry mapping resource type tags to detectors
pub struct DetectorRegistry {
    detectors: BTreeMap<ResourceType, Arc<dyn ChangeDetector>>,
}

impl DetectorRegistry {
    /// An empty registry; every candidate will be rejected as unsupported
    pub fn empty() -> Self {
        Self {
            detectors: BTreeMap::new(),
        }
    }

    /// The standard registry covering every supported resource kind
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(resource_types::LAMBDA_FUNCTION, Arc::new(FunctionDetector));
        registry.register(
            resource_types::CODEBUILD_PROJECT,
            Arc::new(BuildProjectDetector),
        );
        registry.register(
            resource_types::ECS_TASK_DEFINITION,
            Arc::new(TaskDefinitionDetector),
        );
        registry.register(resource_types::STATE_MACHINE, Arc::new(StateMachineDetector));
        let appsync = Arc::new(AppSyncDetector);
        registry.register(resource_types::APPSYNC_RESOLVER, appsync.clone());
        registry.register(resource_types::APPSYNC_FUNCTION, appsync.clone());
        registry.register(resource_types::APPSYNC_SCHEMA, appsync.clone());
        registry.register(resource_types::APPSYNC_API_KEY, appsync);
        registry.register(
            resource_types::BUCKET_DEPLOYMENT,
            Arc::new(BucketDeploymentDetector),
        );
        registry.register(resource_types::IAM_POLICY, Arc::new(IamPolicyDetector));
        registry
    }

    /// Register (or replace) the detector for a type tag
    pub fn register(
        &mut self,
        resource_type: impl Into<ResourceType>,
        detector: Arc<dyn ChangeDetector>,
    ) {
        self.detectors.insert(resource_type.into(), detector);
    }

    /// Look up the detector for a type tag
    pub fn get(&self, resource_type: &ResourceType) -> Option<Arc<dyn ChangeDetector>> {
        self.detectors.get(resource_type).cloned()
    }
}

/// Changed properties split by a type's allow-list
pub(crate) struct PropertyPartition {
    /// Changes the type supports in place, keyed by property name
    pub hotswappable: BTreeMap<String, PropertyDifference>,
    /// Names of everything else
    pub rejected: Vec<String>,
}

/// Partition a change's property updates against an allow-list
pub(crate) fn partition_by_allow_list(
    change: &ResourceDifference,
    allowed: &[&str],
) -> PropertyPartition {
    let mut partition = PropertyPartition {
        hotswappable: BTreeMap::new(),
        rejected: Vec::new(),
    };
    for (name, difference) in &change.property_updates {
        if allowed.contains(&name.as_str()) {
            partition
                .hotswappable
                .insert(name.clone(), difference.clone());
        } else {
            partition.rejected.push(name.clone());
        }
    }
    partition
}

/// One rejection covering every disallowed property of a change. Reason is
/// `Tags` when `Tags` is the sole offender, `Properties` otherwise.
pub(crate) fn rejected_properties_change(
    logical_id: &LogicalId,
    change: &ResourceDifference,
    evaluator: &Arc<dyn StackEvaluator>,
    rejected: Vec<String>,
) -> RejectedChange {
    let resource_type = change
        .resource_type()
        .cloned()
        .unwrap_or_else(|| ResourceType::new("Unknown"));

    let (reason, description) = if rejected == ["Tags"] {
        (
            NonHotswappableReason::Tags,
            format!("the 'Tags' property of resource '{logical_id}' cannot be hotswapped"),
        )
    } else {
        (
            NonHotswappableReason::Properties,
            format!(
                "properties '{}' of resource '{}' cannot be hotswapped",
                rejected.join(", "),
                logical_id,
            ),
        )
    };

    RejectedChange::resource(reason, description, logical_id.clone(), resource_type, rejected)
        .with_construct_path(evaluator.construct_path(logical_id))
}

/// Rejection for a type with no in-place update support, listing every
/// changed property name
pub(crate) fn unsupported_resource_change(
    logical_id: &LogicalId,
    change: &ResourceDifference,
    evaluator: &Arc<dyn StackEvaluator>,
) -> RejectedChange {
    let resource_type = change
        .resource_type()
        .cloned()
        .unwrap_or_else(|| ResourceType::new("Unknown"));

    RejectedChange::resource(
        NonHotswappableReason::ResourceUnsupported,
        format!(
            "resource '{logical_id}' of type '{resource_type}' does not support hotswapping"
        ),
        logical_id.clone(),
        resource_type.clone(),
        change.changed_property_names(),
    )
    .with_construct_path(evaluator.construct_path(logical_id))
}

/// Rejection used when a value the detector needs cannot be evaluated at
/// classification time. Classification must still produce a complete plan,
/// so this is data, not an error.
pub(crate) fn unevaluable_change(
    logical_id: &LogicalId,
    change: &ResourceDifference,
    evaluator: &Arc<dyn StackEvaluator>,
    what: &str,
) -> RejectedChange {
    let resource_type = change
        .resource_type()
        .cloned()
        .unwrap_or_else(|| ResourceType::new("Unknown"));

    RejectedChange::resource(
        NonHotswappableReason::Properties,
        format!("could not evaluate {what} of resource '{logical_id}'"),
        logical_id.clone(),
        resource_type,
        change.changed_property_names(),
    )
    .with_construct_path(evaluator.construct_path(logical_id))
}

/// Desired-side value of a changed property
pub(crate) fn new_value<'a>(
    updates: &'a BTreeMap<String, PropertyDifference>,
    name: &str,
) -> Option<&'a serde_json::Value> {
    updates.get(name).and_then(|d| d.new_value.as_ref())
}

/// String field of an already-evaluated object value
pub(crate) fn string_field(value: &serde_json::Value, name: &str) -> Option<String> {
    value.get(name).and_then(serde_json::Value::as_str).map(str::to_string)
}

/// Test support shared by the detector test modules
#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use strata_types::ResourceDefinition;

    /// Build a modification difference from old/new property bags
    pub(crate) fn modification(
        ty: &str,
        old: serde_json::Value,
        new: serde_json::Value,
    ) -> ResourceDifference {
        let old_properties = old.as_object().cloned().unwrap_or_default();
        let new_properties = new.as_object().cloned().unwrap_or_default();
        let mut updates = BTreeMap::new();
        let names: std::collections::BTreeSet<_> = old_properties
            .keys()
            .chain(new_properties.keys())
            .cloned()
            .collect();
        for name in names {
            let old_value = old_properties.get(&name).cloned();
            let new_value = new_properties.get(&name).cloned();
            if old_value != new_value {
                updates.insert(name, PropertyDifference { old_value, new_value });
            }
        }
        ResourceDifference::modification(
            ResourceDefinition::new(ty, old_properties),
            ResourceDefinition::new(ty, new_properties),
            updates,
        )
    }
}
