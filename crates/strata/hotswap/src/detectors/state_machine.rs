//! State machine hotswap detection
//!
//! Only the workflow definition updates in place. The physical name of a
//! state machine is its ARN.

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
use strata_cloud::{CloudError, ControlPlane, StackEvaluator};
use strata_types::{
    resource_types, AffectedResource, HotswapPropertyOverrides, LogicalId, PropertyDifference,
    ResourceDifference, ResourceType,
};

const HOTSWAPPABLE_PROPERTIES: &[&str] = &["DefinitionString"];

/// Detector for workflow state machines
pub struct StateMachineDetector;

#[async_trait]
impl ChangeDetector for StateMachineDetector {
    fn service(&self) -> &'static str {
        "stepfunctions-state-machine"
    }

    async fn detect(
        &self,
        logical_id: &LogicalId,
        change: &ResourceDifference,
        evaluator: &Arc<dyn StackEvaluator>,
        control: &Arc<dyn ControlPlane>,
        _overrides: &HotswapPropertyOverrides,
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

        let state_machine_arn = match evaluator.physical_name(logical_id).await {
            Ok(Some(arn)) => arn,
            Ok(None) | Err(CloudError::Evaluation(_)) => {
                results.push(ClassifiedChange::Rejected(unevaluable_change(
                    logical_id,
                    change,
                    evaluator,
                    "the state machine ARN",
                )));
                return Ok(results);
            }
            Err(err) => return Err(err.into()),
        };

        let resource_type = change
            .resource_type()
            .cloned()
            .unwrap_or_else(|| ResourceType::new(resource_types::STATE_MACHINE));
        let affected = AffectedResource::new(logical_id.clone(), resource_type)
            .with_physical_name(&state_machine_arn)
            .with_description(format!("State machine '{state_machine_arn}'"));

        let apply = build_apply(
            state_machine_arn,
            partition.hotswappable,
            evaluator.clone(),
            control.clone(),
        );
        results.push(ClassifiedChange::Hotswappable(HotswapOperation::new(
            self.service(),
            vec![affected],
            apply,
        )));
        Ok(results)
    }
}

fn build_apply(
    state_machine_arn: String,
    updates: BTreeMap<String, PropertyDifference>,
    evaluator: Arc<dyn StackEvaluator>,
    control: Arc<dyn ControlPlane>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let definition = match new_value(&updates, "DefinitionString") {
            Some(value) => evaluator.evaluate_to_string(value).await?,
            None => return Ok(()),
        };
        control
            .update_state_machine(&state_machine_arn, &definition)
            .await?;
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

    #[tokio::test]
    async fn test_definition_change_updates_in_place() {
        let control = Arc::new(InMemoryControlPlane::new());
        control.seed_physical_name(
            "wf-stack",
            "Machine1",
            "arn:aws:states:us-east-1:111111111111:stateMachine:orders",
        );
        let template = Template::from_value(json!({
            "Resources": { "Machine1": { "Type": "AWS::StepFunctions::StateMachine" } }
        }))
        .unwrap();
        let evaluator: Arc<dyn StackEvaluator> =
            Arc::new(TemplateEvaluator::new("wf-stack", template, control.clone()));
        let control_plane: Arc<dyn ControlPlane> = control.clone();

        let change = modification(
            resource_types::STATE_MACHINE,
            json!({ "DefinitionString": "{\"StartAt\":\"A\"}" }),
            json!({ "DefinitionString": "{\"StartAt\":\"B\"}" }),
        );
        let results = StateMachineDetector
            .detect(
                &LogicalId::new("Machine1"),
                &change,
                &evaluator,
                &control_plane,
                &HotswapPropertyOverrides::default(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let ClassifiedChange::Hotswappable(operation) = results.into_iter().next().unwrap()
        else {
            panic!("expected a hotswappable operation");
        };

        operation.apply().await.unwrap();
        let call = control.calls().pop().unwrap();
        assert_eq!(call.operation, "update_state_machine");
        assert!(call.target.ends_with("stateMachine:orders"));
        assert_eq!(call.payload["definition"], json!("{\"StartAt\":\"B\"}"));
    }
}
