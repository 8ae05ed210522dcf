//! GraphQL API binding hotswap detection
//!
//! Resolvers, function configurations, schemas, and API keys all replace
//! whole-object: every changed property is applied by re-pushing the full
//! desired definition through the matching update call. One detector
//! serves all four type tags.

use super::{unevaluable_change, ChangeDetector};
use crate::error::Result;
use crate::plan::{ClassifiedChange, HotswapOperation};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use strata_cloud::{CloudError, ControlPlane, StackEvaluator};
use strata_types::{
    resource_types, AffectedResource, HotswapPropertyOverrides, LogicalId, ResourceDifference,
    ResourceType,
};

/// Detector for GraphQL API bindings
pub struct AppSyncDetector;

#[async_trait]
impl ChangeDetector for AppSyncDetector {
    fn service(&self) -> &'static str {
        "appsync"
    }

    async fn detect(
        &self,
        logical_id: &LogicalId,
        change: &ResourceDifference,
        evaluator: &Arc<dyn StackEvaluator>,
        control: &Arc<dyn ControlPlane>,
        _overrides: &HotswapPropertyOverrides,
    ) -> Result<Vec<ClassifiedChange>> {
        if change.property_updates.is_empty() {
            return Ok(vec![]);
        }

        let resource_type = change
            .resource_type()
            .cloned()
            .unwrap_or_else(|| ResourceType::new(resource_types::APPSYNC_RESOLVER));
        let desired_properties = change
            .new_value
            .as_ref()
            .map(|d| Value::Object(d.properties.clone()))
            .unwrap_or(Value::Null);

        if resource_type.as_str() == resource_types::APPSYNC_SCHEMA {
            return self
                .detect_schema(logical_id, change, evaluator, control, resource_type)
                .await;
        }

        let arn = match evaluator.physical_name(logical_id).await {
            Ok(Some(arn)) => arn,
            Ok(None) | Err(CloudError::Evaluation(_)) => {
                return Ok(vec![ClassifiedChange::Rejected(unevaluable_change(
                    logical_id,
                    change,
                    evaluator,
                    "the resource ARN",
                ))]);
            }
            Err(err) => return Err(err.into()),
        };

        let affected = AffectedResource::new(logical_id.clone(), resource_type.clone())
            .with_physical_name(&arn);

        let evaluator = evaluator.clone();
        let control = control.clone();
        let tag = resource_type.as_str().to_string();
        let apply: BoxFuture<'static, Result<()>> = Box::pin(async move {
            let properties = evaluator.evaluate(&desired_properties).await?;
            match tag.as_str() {
                resource_types::APPSYNC_FUNCTION => {
                    control.update_api_function(&arn, properties).await?
                }
                resource_types::APPSYNC_API_KEY => {
                    control.update_api_key(&arn, properties).await?
                }
                _ => control.update_api_resolver(&arn, properties).await?,
            }
            Ok(())
        });

        Ok(vec![ClassifiedChange::Hotswappable(HotswapOperation::new(
            self.service(),
            vec![affected],
            apply,
        ))])
    }
}

impl AppSyncDetector {
    async fn detect_schema(
        &self,
        logical_id: &LogicalId,
        change: &ResourceDifference,
        evaluator: &Arc<dyn StackEvaluator>,
        control: &Arc<dyn ControlPlane>,
        resource_type: ResourceType,
    ) -> Result<Vec<ClassifiedChange>> {
        let api_id_value = change
            .new_value
            .as_ref()
            .and_then(|d| d.property("ApiId").cloned());
        let api_id = match api_id_value {
            Some(value) => match evaluator.evaluate_to_string(&value).await {
                Ok(api_id) => api_id,
                Err(CloudError::Evaluation(_)) => {
                    return Ok(vec![ClassifiedChange::Rejected(unevaluable_change(
                        logical_id, change, evaluator, "the API id",
                    ))]);
                }
                Err(err) => return Err(err.into()),
            },
            None => {
                return Ok(vec![ClassifiedChange::Rejected(unevaluable_change(
                    logical_id, change, evaluator, "the API id",
                ))]);
            }
        };

        let definition = change
            .new_value
            .as_ref()
            .and_then(|d| d.property("Definition").cloned())
            .unwrap_or(Value::Null);

        let affected = AffectedResource::new(logical_id.clone(), resource_type)
            .with_physical_name(&api_id)
            .with_description(format!("GraphQL schema of API '{api_id}'"));

        let evaluator = evaluator.clone();
        let control = control.clone();
        let apply: BoxFuture<'static, Result<()>> = Box::pin(async move {
            let definition = evaluator.evaluate_to_string(&definition).await?;
            control.update_api_schema(&api_id, definition).await?;
            Ok(())
        });

        Ok(vec![ClassifiedChange::Hotswappable(HotswapOperation::new(
            self.service(),
            vec![affected],
            apply,
        ))])
    }
}
