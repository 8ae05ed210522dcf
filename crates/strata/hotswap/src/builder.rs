//! Change-set builder
//!
//! Walks a full template diff (including nested stacks) and produces the
//! total partition of every change into hotswappable operations and
//! rejections. Detector invocations are independent and run concurrently,
//! but all complete before this returns; a detector error aborts the whole
//! pass, since a silently-incomplete classification could skip a needed
//! rejection notice.

use crate::classify::structural_rejection;
use crate::detectors::{unsupported_resource_change, DetectorRegistry};
use crate::diff::TemplateDiffer;
use crate::error::Result;
use crate::plan::HotswapPlan;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_cloud::{ControlPlane, StackEvaluator};
use strata_types::{
    HotswapPropertyOverrides, LogicalId, NestedStackTemplates, NonHotswappableReason,
    RejectedChange, ResourceDifference, TemplateDiff,
};
use tracing::debug;

/// Classify every resource and output change of a template diff.
///
/// `nested_stacks` carries the deployed/generated template pairs for the
/// stack's nested stacks, keyed by their logical IDs in this scope.
pub async fn classify_template_diff(
    diff: TemplateDiff,
    evaluator: Arc<dyn StackEvaluator>,
    control: &Arc<dyn ControlPlane>,
    registry: &DetectorRegistry,
    differ: &Arc<dyn TemplateDiffer>,
    nested_stacks: &BTreeMap<LogicalId, NestedStackTemplates>,
    overrides: &HotswapPropertyOverrides,
) -> Result<HotswapPlan> {
    classify_scope(
        diff,
        evaluator,
        control,
        registry,
        differ,
        nested_stacks,
        overrides,
    )
    .await
}

fn classify_scope<'a>(
    diff: TemplateDiff,
    evaluator: Arc<dyn StackEvaluator>,
    control: &'a Arc<dyn ControlPlane>,
    registry: &'a DetectorRegistry,
    differ: &'a Arc<dyn TemplateDiffer>,
    nested_stacks: &'a BTreeMap<LogicalId, NestedStackTemplates>,
    overrides: &'a HotswapPropertyOverrides,
) -> BoxFuture<'a, Result<HotswapPlan>> {
    Box::pin(async move {
        let mut plan = HotswapPlan::default();

        // 1. Stack outputs never hotswap
        for output_id in diff.outputs.keys() {
            plan.rejected.push(RejectedChange::output(
                output_id.clone(),
                format!("output '{output_id}' was changed by this deployment; stack outputs cannot be hotswapped"),
            ));
        }

        // 2. Collapse logical-ID renames before any type-specific
        //    detection; otherwise a pure rename reads as delete+create
        let changes = collapse_renames(diff.resources);

        // 3. Classify each remaining change
        let mut pending: Vec<BoxFuture<'_, Result<HotswapPlan>>> = Vec::new();
        for (logical_id, change) in changes {
            let Some(resource_type) = change.resource_type().cloned() else {
                continue;
            };

            // The synthesizer's metadata resource is the one carve-out that
            // classification ignores outright
            if resource_type.is_metadata() {
                continue;
            }

            // Nested stacks descend instead of routing to a detector
            if resource_type.is_nested_stack() && change.new_value.is_some() {
                let old_is_nested = change
                    .old_value
                    .as_ref()
                    .is_some_and(|old| old.resource_type.is_nested_stack());

                if change.old_value.is_none() || old_is_nested {
                    let known = nested_stacks
                        .get(&logical_id)
                        .and_then(|n| n.physical_name.as_ref().map(|p| (n, p.clone())));
                    match known {
                        Some((nested, physical_name)) if change.old_value.is_some() => {
                            debug!(
                                nested_stack = %logical_id,
                                physical_name = %physical_name,
                                "Descending into nested stack"
                            );
                            let scope = evaluator
                                .nested_scope(&physical_name, nested.generated_template.clone());
                            let nested_diff =
                                differ.diff(&nested.deployed_template, &nested.generated_template);
                            pending.push(classify_scope(
                                nested_diff,
                                scope,
                                control,
                                registry,
                                differ,
                                &nested.nested_stack_templates,
                                overrides,
                            ));
                        }
                        _ => {
                            // Newly created nested stack: reject and never
                            // visit its children
                            plan.rejected.push(
                                RejectedChange::resource(
                                    NonHotswappableReason::NestedStackCreation,
                                    format!(
                                        "nested stack '{logical_id}' was created by this deployment"
                                    ),
                                    logical_id.clone(),
                                    resource_type,
                                    vec![],
                                )
                                .with_construct_path(evaluator.construct_path(&logical_id)),
                            );
                        }
                    }
                    continue;
                }
                // The old side is not a nested stack: a type change, which
                // the structural classifier rejects below
            }

            if let Some(rejection) = structural_rejection(&logical_id, &change) {
                plan.rejected
                    .push(rejection.with_construct_path(evaluator.construct_path(&logical_id)));
                continue;
            }

            match registry.get(&resource_type) {
                None => {
                    plan.rejected
                        .push(unsupported_resource_change(&logical_id, &change, &evaluator));
                }
                Some(detector) => {
                    let evaluator = evaluator.clone();
                    let control = control.clone();
                    pending.push(Box::pin(async move {
                        let mut sub_plan = HotswapPlan::default();
                        let verdicts = detector
                            .detect(&logical_id, &change, &evaluator, &control, overrides)
                            .await?;
                        sub_plan.absorb(verdicts);
                        Ok(sub_plan)
                    }));
                }
            }
        }

        // All detector invocations and nested descents must complete; the
        // first error aborts the pass
        for sub_plan in futures::future::try_join_all(pending).await? {
            plan.merge(sub_plan);
        }
        Ok(plan)
    })
}

/// Collapse removal+addition pairs that are really renames.
///
/// A rename is a pair with identical resource types and deeply-equal
/// property bags (canonical equality: map-order independent, sequence-order
/// dependent). The pair becomes one modification carrying the removal's old
/// value under the addition's logical ID, and the removal is dropped.
fn collapse_renames(
    resources: BTreeMap<LogicalId, ResourceDifference>,
) -> Vec<(LogicalId, ResourceDifference)> {
    let mut additions = Vec::new();
    let mut removals: BTreeMap<LogicalId, ResourceDifference> = BTreeMap::new();
    let mut collapsed = Vec::new();

    for (logical_id, change) in resources {
        if change.is_addition() {
            additions.push((logical_id, change));
        } else if change.is_removal() {
            removals.insert(logical_id, change);
        } else {
            collapsed.push((logical_id, change));
        }
    }

    for (logical_id, mut addition) in additions {
        let matched = addition.new_value.as_ref().and_then(|new| {
            removals.iter().find_map(|(removal_id, removal)| {
                removal.old_value.as_ref().and_then(|old| {
                    (old.resource_type == new.resource_type && old.properties == new.properties)
                        .then(|| removal_id.clone())
                })
            })
        });

        if let Some(removal_id) = matched {
            if let Some(removal) = removals.remove(&removal_id) {
                debug!(from = %removal_id, to = %logical_id, "Collapsed logical-ID rename");
                addition.old_value = removal.old_value;
            }
        }
        collapsed.push((logical_id, addition));
    }

    collapsed.extend(removals);
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{StructuralTemplateDiffer, TemplateDiffer};
    use serde_json::json;
    use strata_cloud::{InMemoryControlPlane, TemplateEvaluator};
    use strata_types::{RejectionSubject, Template};

    struct Harness {
        control: Arc<InMemoryControlPlane>,
        control_plane: Arc<dyn ControlPlane>,
        registry: DetectorRegistry,
        differ: Arc<dyn TemplateDiffer>,
        overrides: HotswapPropertyOverrides,
    }

    impl Harness {
        fn new() -> Self {
            let control = Arc::new(InMemoryControlPlane::new());
            Self {
                control_plane: control.clone(),
                control,
                registry: DetectorRegistry::standard(),
                differ: Arc::new(StructuralTemplateDiffer),
                overrides: HotswapPropertyOverrides::default(),
            }
        }

        async fn classify(
            &self,
            stack_name: &str,
            deployed: serde_json::Value,
            desired: serde_json::Value,
            nested: BTreeMap<LogicalId, NestedStackTemplates>,
        ) -> HotswapPlan {
            let deployed = Template::from_value(deployed).unwrap();
            let desired = Template::from_value(desired).unwrap();
            let evaluator: Arc<dyn StackEvaluator> = Arc::new(TemplateEvaluator::new(
                stack_name,
                desired.clone(),
                self.control.clone(),
            ));
            let diff = self.differ.diff(&deployed, &desired);
            classify_template_diff(
                diff,
                evaluator,
                &self.control_plane,
                &self.registry,
                &self.differ,
                &nested,
                &self.overrides,
            )
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn test_function_code_change_is_one_operation_and_no_rejections() {
        let harness = Harness::new();
        harness
            .control
            .seed_physical_name("web-stack", "Fn1", "web-stack-fn1");

        let plan = harness
            .classify(
                "web-stack",
                json!({ "Resources": { "Fn1": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": { "Code": { "S3Key": "a" } }
                } } }),
                json!({ "Resources": { "Fn1": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": { "Code": { "S3Key": "b" } }
                } } }),
                BTreeMap::new(),
            )
            .await;

        assert_eq!(plan.hotswappable.len(), 1);
        assert!(plan.rejected.is_empty());
        assert_eq!(
            plan.hotswappable[0].affected_resources()[0]
                .logical_id
                .as_str(),
            "Fn1"
        );
    }

    #[tokio::test]
    async fn test_unregistered_type_is_rejected_listing_changed_properties() {
        let harness = Harness::new();

        let plan = harness
            .classify(
                "web-stack",
                json!({ "Resources": { "Role1": {
                    "Type": "AWS::IAM::Role",
                    "Properties": { "Description": "x" }
                } } }),
                json!({ "Resources": { "Role1": {
                    "Type": "AWS::IAM::Role",
                    "Properties": { "Description": "y" }
                } } }),
                BTreeMap::new(),
            )
            .await;

        assert!(plan.hotswappable.is_empty());
        assert_eq!(plan.rejected.len(), 1);
        let rejected = &plan.rejected[0];
        assert_eq!(rejected.reason, NonHotswappableReason::ResourceUnsupported);
        let RejectionSubject::Resource {
            rejected_properties,
            ..
        } = &rejected.subject
        else {
            panic!("expected a resource subject");
        };
        assert_eq!(rejected_properties, &vec!["Description".to_string()]);
    }

    #[tokio::test]
    async fn test_rename_collapses_into_a_single_classified_change() {
        let harness = Harness::new();

        let plan = harness
            .classify(
                "web-stack",
                json!({ "Resources": { "A": {
                    "Type": "AWS::S3::Bucket",
                    "Properties": { "Name": "foo" }
                } } }),
                json!({ "Resources": { "B": {
                    "Type": "AWS::S3::Bucket",
                    "Properties": { "Name": "foo" }
                } } }),
                BTreeMap::new(),
            )
            .await;

        // One rejection against the collapsed change, not two
        assert!(plan.hotswappable.is_empty());
        assert_eq!(plan.rejected.len(), 1);
        let rejected = &plan.rejected[0];
        assert_eq!(rejected.reason, NonHotswappableReason::ResourceUnsupported);
        let RejectionSubject::Resource { logical_id, .. } = &rejected.subject else {
            panic!("expected a resource subject");
        };
        assert_eq!(logical_id.as_str(), "B");
    }

    #[tokio::test]
    async fn test_rename_with_different_properties_stays_create_plus_delete() {
        let harness = Harness::new();

        let plan = harness
            .classify(
                "web-stack",
                json!({ "Resources": { "A": {
                    "Type": "AWS::S3::Bucket",
                    "Properties": { "Name": "foo" }
                } } }),
                json!({ "Resources": { "B": {
                    "Type": "AWS::S3::Bucket",
                    "Properties": { "Name": "bar" }
                } } }),
                BTreeMap::new(),
            )
            .await;

        let mut reasons: Vec<_> = plan.rejected.iter().map(|r| r.reason).collect();
        reasons.sort_by_key(|r| format!("{r:?}"));
        assert_eq!(
            reasons,
            vec![
                NonHotswappableReason::ResourceCreation,
                NonHotswappableReason::ResourceDeletion,
            ]
        );
    }

    #[tokio::test]
    async fn test_output_changes_are_rejected() {
        let harness = Harness::new();

        let plan = harness
            .classify(
                "web-stack",
                json!({ "Outputs": { "Url": { "Value": "a" } } }),
                json!({ "Outputs": { "Url": { "Value": "b" } } }),
                BTreeMap::new(),
            )
            .await;

        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].reason, NonHotswappableReason::Output);
        assert!(matches!(
            plan.rejected[0].subject,
            RejectionSubject::Output { .. }
        ));
    }

    #[tokio::test]
    async fn test_metadata_resource_changes_are_ignored() {
        let harness = Harness::new();

        let plan = harness
            .classify(
                "web-stack",
                json!({ "Resources": { "CDKMetadata": {
                    "Type": "AWS::CDK::Metadata",
                    "Properties": { "Analytics": "v1" }
                } } }),
                json!({ "Resources": { "CDKMetadata": {
                    "Type": "AWS::CDK::Metadata",
                    "Properties": { "Analytics": "v2" }
                } } }),
                BTreeMap::new(),
            )
            .await;

        assert!(plan.hotswappable.is_empty());
        assert!(plan.rejected.is_empty());
    }

    #[tokio::test]
    async fn test_new_nested_stack_rejects_without_visiting_children() {
        let harness = Harness::new();

        // The nested map has no entry (no physical name is known), and the
        // nested templates would contain a removal that must never surface
        let plan = harness
            .classify(
                "web-stack",
                json!({}),
                json!({ "Resources": { "Inner": {
                    "Type": "AWS::CloudFormation::Stack",
                    "Properties": { "TemplateURL": "https://assets/inner-v1.json" }
                } } }),
                BTreeMap::new(),
            )
            .await;

        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(
            plan.rejected[0].reason,
            NonHotswappableReason::NestedStackCreation
        );
    }

    #[tokio::test]
    async fn test_nested_stack_changes_classify_in_their_own_scope() {
        let harness = Harness::new();
        harness
            .control
            .seed_physical_name("web-stack-inner-1XYZ", "NestedFn", "inner-fn");

        let nested_deployed = Template::from_value(json!({ "Resources": { "NestedFn": {
            "Type": "AWS::Lambda::Function",
            "Properties": { "Code": { "S3Key": "a" } }
        } } }))
        .unwrap();
        let nested_generated = Template::from_value(json!({ "Resources": { "NestedFn": {
            "Type": "AWS::Lambda::Function",
            "Properties": { "Code": { "S3Key": "b" } }
        } } }))
        .unwrap();

        let mut nested = BTreeMap::new();
        nested.insert(
            LogicalId::new("Inner"),
            NestedStackTemplates {
                physical_name: Some("web-stack-inner-1XYZ".to_string()),
                deployed_template: nested_deployed,
                generated_template: nested_generated,
                nested_stack_templates: BTreeMap::new(),
            },
        );

        let plan = harness
            .classify(
                "web-stack",
                json!({ "Resources": { "Inner": {
                    "Type": "AWS::CloudFormation::Stack",
                    "Properties": { "TemplateURL": "https://assets/inner-v1.json" }
                } } }),
                json!({ "Resources": { "Inner": {
                    "Type": "AWS::CloudFormation::Stack",
                    "Properties": { "TemplateURL": "https://assets/inner-v2.json" }
                } } }),
                nested,
            )
            .await;

        assert!(plan.rejected.is_empty());
        assert_eq!(plan.hotswappable.len(), 1);
        assert_eq!(
            plan.hotswappable[0].affected_resources()[0]
                .logical_id
                .as_str(),
            "NestedFn"
        );
    }

    #[tokio::test]
    async fn test_every_change_lands_in_exactly_one_partition() {
        let harness = Harness::new();
        harness
            .control
            .seed_physical_name("web-stack", "Fn1", "web-stack-fn1");

        // One hotswappable modify, one unsupported modify, one creation,
        // one deletion, one ignored metadata change: 4 classified changes
        let plan = harness
            .classify(
                "web-stack",
                json!({ "Resources": {
                    "Fn1": { "Type": "AWS::Lambda::Function", "Properties": { "Code": { "S3Key": "a" } } },
                    "Role1": { "Type": "AWS::IAM::Role", "Properties": { "Description": "x" } },
                    "OldQueue": { "Type": "AWS::SQS::Queue", "Properties": { "Name": "q1" } },
                    "CDKMetadata": { "Type": "AWS::CDK::Metadata", "Properties": { "Analytics": "v1" } }
                } }),
                json!({ "Resources": {
                    "Fn1": { "Type": "AWS::Lambda::Function", "Properties": { "Code": { "S3Key": "b" } } },
                    "Role1": { "Type": "AWS::IAM::Role", "Properties": { "Description": "y" } },
                    "NewTopic": { "Type": "AWS::SNS::Topic", "Properties": { "Name": "t1" } },
                    "CDKMetadata": { "Type": "AWS::CDK::Metadata", "Properties": { "Analytics": "v2" } }
                } }),
                BTreeMap::new(),
            )
            .await;

        assert_eq!(plan.hotswappable.len() + plan.rejected.len(), 4);
        assert_eq!(plan.hotswappable.len(), 1);
    }

    #[test]
    fn test_collapse_is_keyed_on_type_and_deep_property_equality() {
        let bucket = |name: &str| {
            strata_types::ResourceDefinition::new(
                "AWS::S3::Bucket",
                json!({ "Name": name }).as_object().cloned().unwrap(),
            )
        };

        let mut resources = BTreeMap::new();
        resources.insert(
            LogicalId::new("Old"),
            ResourceDifference::removal(bucket("foo")),
        );
        resources.insert(
            LogicalId::new("New"),
            ResourceDifference::addition(bucket("foo")),
        );

        let collapsed = collapse_renames(resources);
        assert_eq!(collapsed.len(), 1);
        let (logical_id, change) = &collapsed[0];
        assert_eq!(logical_id.as_str(), "New");
        assert!(change.old_value.is_some());
        assert!(change.new_value.is_some());
    }
}
