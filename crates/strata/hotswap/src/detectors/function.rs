//! Function hotswap detection
//!
//! Code location, environment, layers, description, and runtime
//! configuration all update in place. The apply step pushes code and
//! configuration separately, then waits for the function to leave its
//! updating state.

use super::{
    new_value, partition_by_allow_list, rejected_properties_change, string_field,
    unevaluable_change, ChangeDetector,
};
use crate::error::Result;
use crate::plan::{ClassifiedChange, HotswapOperation};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_cloud::{
    CloudError, ControlPlane, FunctionCodeUpdate, FunctionConfigurationUpdate, StackEvaluator,
};
use strata_types::{
    resource_types, AffectedResource, HotswapPropertyOverrides, LogicalId, PropertyDifference,
    ResourceDifference, ResourceType,
};

const HOTSWAPPABLE_PROPERTIES: &[&str] = &[
    "Code",
    "Environment",
    "Description",
    "Layers",
    "Runtime",
    "Handler",
];

/// Detector for function resources
pub struct FunctionDetector;

#[async_trait]
impl ChangeDetector for FunctionDetector {
    fn service(&self) -> &'static str {
        "lambda-function"
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

        let function_name = match resolve_function_name(logical_id, change, evaluator).await? {
            Some(name) => name,
            None => {
                results.push(ClassifiedChange::Rejected(unevaluable_change(
                    logical_id,
                    change,
                    evaluator,
                    "the function name",
                )));
                return Ok(results);
            }
        };

        let resource_type = change
            .resource_type()
            .cloned()
            .unwrap_or_else(|| ResourceType::new(resource_types::LAMBDA_FUNCTION));
        let affected = AffectedResource::new(logical_id.clone(), resource_type)
            .with_physical_name(&function_name)
            .with_description(format!("Function '{function_name}'"));

        let apply = build_apply(
            function_name,
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

async fn resolve_function_name(
    logical_id: &LogicalId,
    change: &ResourceDifference,
    evaluator: &Arc<dyn StackEvaluator>,
) -> Result<Option<String>> {
    if let Some(value) = change
        .new_value
        .as_ref()
        .and_then(|d| d.property("FunctionName"))
    {
        return match evaluator.evaluate_to_string(value).await {
            Ok(name) => Ok(Some(name)),
            Err(CloudError::Evaluation(_)) => Ok(None),
            Err(err) => Err(err.into()),
        };
    }
    match evaluator.physical_name(logical_id).await {
        Ok(name) => Ok(name),
        Err(CloudError::Evaluation(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn build_apply(
    function_name: String,
    updates: BTreeMap<String, PropertyDifference>,
    evaluator: Arc<dyn StackEvaluator>,
    control: Arc<dyn ControlPlane>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        if let Some(code) = new_value(&updates, "Code") {
            let evaluated = evaluator.evaluate(code).await?;
            let code_update = FunctionCodeUpdate {
                s3_bucket: string_field(&evaluated, "S3Bucket"),
                s3_key: string_field(&evaluated, "S3Key"),
                image_uri: string_field(&evaluated, "ImageUri"),
                zip_file: string_field(&evaluated, "ZipFile"),
            };
            if !code_update.is_empty() {
                control
                    .update_function_code(&function_name, code_update)
                    .await?;
            }
        }

        let mut configuration = FunctionConfigurationUpdate::default();
        if let Some(environment) = new_value(&updates, "Environment") {
            configuration.environment = Some(evaluator.evaluate(environment).await?);
        }
        if let Some(description) = new_value(&updates, "Description") {
            configuration.description = Some(evaluator.evaluate_to_string(description).await?);
        }
        if let Some(layers) = new_value(&updates, "Layers") {
            let evaluated = evaluator.evaluate(layers).await?;
            let layers = evaluated
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            configuration.layers = Some(layers);
        }
        if let Some(runtime) = new_value(&updates, "Runtime") {
            configuration.runtime = Some(evaluator.evaluate_to_string(runtime).await?);
        }
        if let Some(handler) = new_value(&updates, "Handler") {
            configuration.handler = Some(evaluator.evaluate_to_string(handler).await?);
        }
        if !configuration.is_empty() {
            control
                .update_function_configuration(&function_name, configuration)
                .await?;
        }

        control.wait_function_updated(&function_name).await?;
        Ok(())
    })
}
