//! Task definition hotswap detection
//!
//! Container definitions hotswap by registering a new task-definition
//! revision and rolling every referencing container service onto it with a
//! forced redeployment. Resources other than services that reference the
//! task definition block the dependency from being updated in place.

use super::{
    new_value, partition_by_allow_list, rejected_properties_change, unevaluable_change,
    ChangeDetector,
};
use crate::error::Result;
use crate::plan::{ClassifiedChange, HotswapOperation};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_cloud::{CloudError, ControlPlane, ServiceUpdate, StackEvaluator};
use strata_types::{
    resource_types, AffectedResource, EcsHotswapProperties, HotswapPropertyOverrides, LogicalId,
    NonHotswappableReason, PropertyDifference, RejectedChange, ResourceDifference, ResourceType,
};

const HOTSWAPPABLE_PROPERTIES: &[&str] = &["ContainerDefinitions"];

/// Rollout target parsed from a service's physical name
#[derive(Debug, Clone, PartialEq)]
struct ServiceTarget {
    logical_id: LogicalId,
    cluster: String,
    service: String,
}

/// Detector for container task definitions
pub struct TaskDefinitionDetector;

#[async_trait]
impl ChangeDetector for TaskDefinitionDetector {
    fn service(&self) -> &'static str {
        "ecs-service"
    }

    async fn detect(
        &self,
        logical_id: &LogicalId,
        change: &ResourceDifference,
        evaluator: &Arc<dyn StackEvaluator>,
        control: &Arc<dyn ControlPlane>,
        overrides: &HotswapPropertyOverrides,
    ) -> Result<Vec<ClassifiedChange>> {
        let partition = partition_by_allow_list(change, HOTSWAPPABLE_PROPERTIES);
        let mut results = Vec::new();

        if !partition.rejected.is_empty() {
            results.push(ClassifiedChange::Rejected(rejected_properties_change(
                logical_id,
                change,
                evaluator,
                partition.rejected,
            )));
        }
        if partition.hotswappable.is_empty() {
            return Ok(results);
        }

        let family = match resolve_family(logical_id, change, evaluator).await? {
            Some(family) => family,
            None => {
                results.push(ClassifiedChange::Rejected(unevaluable_change(
                    logical_id,
                    change,
                    evaluator,
                    "the task definition family",
                )));
                return Ok(results);
            }
        };

        let resource_type = change
            .resource_type()
            .cloned()
            .unwrap_or_else(|| ResourceType::new(resource_types::ECS_TASK_DEFINITION));

        // Walk everything that references this task definition. Services
        // roll onto the new revision; anything else blocks in place.
        let mut targets = Vec::new();
        for reference in evaluator.references_to(logical_id) {
            if reference.resource_type.as_str() == resource_types::ECS_SERVICE {
                match evaluator.physical_name(&reference.logical_id).await {
                    Ok(Some(arn)) => match parse_service_arn(&arn) {
                        Some((cluster, service)) => targets.push(ServiceTarget {
                            logical_id: reference.logical_id.clone(),
                            cluster,
                            service,
                        }),
                        None => {
                            results.push(ClassifiedChange::Rejected(
                                service_unresolved(&reference.logical_id, evaluator),
                            ));
                        }
                    },
                    Ok(None) | Err(CloudError::Evaluation(_)) => {
                        results.push(ClassifiedChange::Rejected(service_unresolved(
                            &reference.logical_id,
                            evaluator,
                        )));
                    }
                    Err(err) => return Err(err.into()),
                }
            } else {
                results.push(ClassifiedChange::Rejected(
                    RejectedChange::resource(
                        NonHotswappableReason::DependencyUnsupported,
                        format!(
                            "resource '{}' of type '{}' references task definition '{}' and cannot be redeployed in place",
                            reference.logical_id, reference.resource_type, logical_id,
                        ),
                        reference.logical_id.clone(),
                        reference.resource_type.clone(),
                        vec![],
                    )
                    .with_construct_path(evaluator.construct_path(&reference.logical_id)),
                ));
            }
        }

        if targets.is_empty() {
            // Kept for fall-back mode only; in hotswap-only mode the change
            // is already covered by the task-definition operation and would
            // double-report.
            results.push(ClassifiedChange::Rejected(
                RejectedChange::resource(
                    NonHotswappableReason::DependencyUnsupported,
                    format!("no container service references task definition '{logical_id}'"),
                    logical_id.clone(),
                    resource_type.clone(),
                    vec![],
                )
                .with_construct_path(evaluator.construct_path(logical_id))
                .hidden(),
            ));
        }

        let mut affected = vec![AffectedResource::new(logical_id.clone(), resource_type)
            .with_description(format!("Task definition family '{family}'"))];
        for target in &targets {
            affected.push(
                AffectedResource::new(
                    target.logical_id.clone(),
                    ResourceType::new(resource_types::ECS_SERVICE),
                )
                .with_physical_name(format!("{}/{}", target.cluster, target.service))
                .with_description(format!("Service '{}'", target.service)),
            );
        }

        let apply = build_apply(
            family,
            partition.hotswappable,
            targets,
            evaluator.clone(),
            control.clone(),
            overrides.ecs_or_default(),
        );
        results.push(ClassifiedChange::Hotswappable(HotswapOperation::new(
            self.service(),
            affected,
            apply,
        )));
        Ok(results)
    }
}

async fn resolve_family(
    logical_id: &LogicalId,
    change: &ResourceDifference,
    evaluator: &Arc<dyn StackEvaluator>,
) -> Result<Option<String>> {
    if let Some(value) = change.new_value.as_ref().and_then(|d| d.property("Family")) {
        return match evaluator.evaluate_to_string(value).await {
            Ok(family) => Ok(Some(family)),
            Err(CloudError::Evaluation(_)) => Ok(None),
            Err(err) => Err(err.into()),
        };
    }
    match evaluator.physical_name(logical_id).await {
        Ok(Some(physical_name)) => Ok(Some(family_from_physical_name(&physical_name))),
        Ok(None) => Ok(None),
        Err(CloudError::Evaluation(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// The physical name of a task definition is its revision ARN,
/// `...:task-definition/<family>:<revision>`
fn family_from_physical_name(physical_name: &str) -> String {
    match physical_name.split_once("task-definition/") {
        Some((_, rest)) => rest.split(':').next().unwrap_or(rest).to_string(),
        None => physical_name.to_string(),
    }
}

/// Service ARNs are `...:service/<cluster>/<service>`; the older format
/// omits the cluster, which then is the default cluster
fn parse_service_arn(arn: &str) -> Option<(String, String)> {
    let rest = arn.split_once("service/")?.1;
    let mut segments = rest.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(cluster), Some(service), None) => Some((cluster.to_string(), service.to_string())),
        (Some(service), None, None) => Some(("default".to_string(), service.to_string())),
        _ => None,
    }
}

fn service_unresolved(
    service_logical_id: &LogicalId,
    evaluator: &Arc<dyn StackEvaluator>,
) -> RejectedChange {
    RejectedChange::resource(
        NonHotswappableReason::Properties,
        format!("could not determine the physical name of service '{service_logical_id}'"),
        service_logical_id.clone(),
        ResourceType::new(resource_types::ECS_SERVICE),
        vec![],
    )
    .with_construct_path(evaluator.construct_path(service_logical_id))
}

fn build_apply(
    family: String,
    updates: BTreeMap<String, PropertyDifference>,
    targets: Vec<ServiceTarget>,
    evaluator: Arc<dyn StackEvaluator>,
    control: Arc<dyn ControlPlane>,
    ecs: EcsHotswapProperties,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let container_definitions = match new_value(&updates, "ContainerDefinitions") {
            Some(value) => evaluator.evaluate(value).await?,
            None => return Ok(()),
        };

        // Register the new revision strictly before updating dependents
        let task_definition_arn = control
            .register_task_definition(&family, container_definitions)
            .await?;

        // Roll every referencing service concurrently; all rollouts are
        // awaited before the operation is considered complete
        let rollouts = targets.iter().map(|target| {
            let control = control.clone();
            let task_definition_arn = task_definition_arn.clone();
            async move {
                control
                    .update_service(ServiceUpdate {
                        cluster: target.cluster.clone(),
                        service: target.service.clone(),
                        task_definition_arn,
                        force_new_deployment: true,
                        minimum_healthy_percent: Some(ecs.minimum_healthy_percent()),
                        maximum_healthy_percent: ecs.maximum_healthy_percent(),
                    })
                    .await?;
                control
                    .wait_service_stable(&target.cluster, &target.service)
                    .await
            }
        });
        futures::future::try_join_all(rollouts).await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::super::testutil::modification;
    use super::*;
    use serde_json::json;
    use strata_cloud::{InMemoryControlPlane, TemplateEvaluator};
    use strata_types::Template;

    const TASK_DEF_ARN: &str =
        "arn:aws:ecs:us-east-1:111111111111:task-definition/web:3";
    const SERVICE_ARN: &str =
        "arn:aws:ecs:us-east-1:111111111111:service/prod-cluster/web-service";

    fn container_change() -> ResourceDifference {
        modification(
            resource_types::ECS_TASK_DEFINITION,
            json!({ "ContainerDefinitions": [{ "Image": "web:1" }] }),
            json!({ "ContainerDefinitions": [{ "Image": "web:2" }] }),
        )
    }

    fn scope(
        control: &Arc<InMemoryControlPlane>,
        template: serde_json::Value,
    ) -> (Arc<dyn StackEvaluator>, Arc<dyn ControlPlane>) {
        (
            Arc::new(TemplateEvaluator::new(
                "app-stack",
                Template::from_value(template).unwrap(),
                control.clone(),
            )),
            control.clone() as Arc<dyn ControlPlane>,
        )
    }

    #[tokio::test]
    async fn test_zero_services_yields_operation_plus_hidden_rejection() {
        let control = Arc::new(InMemoryControlPlane::new());
        control.seed_physical_name("app-stack", "TaskDef", TASK_DEF_ARN);
        let (evaluator, control_plane) = scope(
            &control,
            json!({ "Resources": { "TaskDef": { "Type": "AWS::ECS::TaskDefinition" } } }),
        );

        let results = TaskDefinitionDetector
            .detect(
                &LogicalId::new("TaskDef"),
                &container_change(),
                &evaluator,
                &control_plane,
                &HotswapPropertyOverrides::default(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let rejected = results
            .iter()
            .find_map(|c| match c {
                ClassifiedChange::Rejected(r) => Some(r),
                _ => None,
            })
            .unwrap();
        assert_eq!(rejected.reason, NonHotswappableReason::DependencyUnsupported);
        assert!(!rejected.visible_in_hotswap_only_mode);
        assert!(results
            .iter()
            .any(|c| matches!(c, ClassifiedChange::Hotswappable(_))));
    }

    #[tokio::test]
    async fn test_apply_registers_revision_then_rolls_services() {
        let control = Arc::new(InMemoryControlPlane::new());
        control.seed_physical_name("app-stack", "TaskDef", TASK_DEF_ARN);
        control.seed_physical_name("app-stack", "Service", SERVICE_ARN);
        let (evaluator, control_plane) = scope(
            &control,
            json!({
                "Resources": {
                    "TaskDef": { "Type": "AWS::ECS::TaskDefinition" },
                    "Service": {
                        "Type": "AWS::ECS::Service",
                        "Properties": { "TaskDefinition": { "Ref": "TaskDef" } }
                    }
                }
            }),
        );

        let overrides = HotswapPropertyOverrides::new(Some(
            EcsHotswapProperties::new(Some(50), Some(150)).unwrap(),
        ));
        let results = TaskDefinitionDetector
            .detect(
                &LogicalId::new("TaskDef"),
                &container_change(),
                &evaluator,
                &control_plane,
                &overrides,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let ClassifiedChange::Hotswappable(operation) = results.into_iter().next().unwrap()
        else {
            panic!("expected a hotswappable operation");
        };
        assert_eq!(operation.affected_resources().len(), 2);

        operation.apply().await.unwrap();

        let operations: Vec<_> = control
            .operation_names()
            .into_iter()
            .filter(|op| op != "describe_stack_resource")
            .collect();
        assert_eq!(
            operations,
            vec![
                "register_task_definition",
                "update_service",
                "wait_service_stable"
            ]
        );

        let update = control
            .calls()
            .into_iter()
            .find(|c| c.operation == "update_service")
            .unwrap();
        assert_eq!(update.target, "prod-cluster/web-service");
        assert_eq!(update.payload["force_new_deployment"], json!(true));
        assert_eq!(update.payload["minimum_healthy_percent"], json!(50));
        assert_eq!(update.payload["maximum_healthy_percent"], json!(150));
        assert!(update.payload["task_definition_arn"]
            .as_str()
            .unwrap()
            .contains("task-definition/web:"));
    }

    #[tokio::test]
    async fn test_non_service_reference_is_a_visible_dependency_rejection() {
        let control = Arc::new(InMemoryControlPlane::new());
        control.seed_physical_name("app-stack", "TaskDef", TASK_DEF_ARN);
        let (evaluator, control_plane) = scope(
            &control,
            json!({
                "Resources": {
                    "TaskDef": { "Type": "AWS::ECS::TaskDefinition" },
                    "Alarm": {
                        "Type": "AWS::CloudWatch::Alarm",
                        "Properties": { "Dimensions": { "Fn::GetAtt": ["TaskDef", "Arn"] } }
                    }
                }
            }),
        );

        let results = TaskDefinitionDetector
            .detect(
                &LogicalId::new("TaskDef"),
                &container_change(),
                &evaluator,
                &control_plane,
                &HotswapPropertyOverrides::default(),
            )
            .await
            .unwrap();

        let visible_rejections: Vec<_> = results
            .iter()
            .filter_map(|c| match c {
                ClassifiedChange::Rejected(r) if r.visible_in_hotswap_only_mode => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(visible_rejections.len(), 1);
        assert_eq!(
            visible_rejections[0].reason,
            NonHotswappableReason::DependencyUnsupported
        );
        assert!(visible_rejections[0].description.contains("Alarm"));
    }
}
