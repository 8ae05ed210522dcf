//! Build project hotswap detection
//!
//! Source, environment, and source version update in place with a single
//! project-update call.

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
use strata_cloud::{BuildProjectUpdate, CloudError, ControlPlane, StackEvaluator};
use strata_types::{
    resource_types, AffectedResource, HotswapPropertyOverrides, LogicalId, PropertyDifference,
    ResourceDifference, ResourceType,
};

const HOTSWAPPABLE_PROPERTIES: &[&str] = &["Source", "Environment", "SourceVersion"];

/// Detector for build project resources
pub struct BuildProjectDetector;

#[async_trait]
impl ChangeDetector for BuildProjectDetector {
    fn service(&self) -> &'static str {
        "codebuild-project"
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

        let project_name = match resolve_project_name(logical_id, change, evaluator).await? {
            Some(name) => name,
            None => {
                results.push(ClassifiedChange::Rejected(unevaluable_change(
                    logical_id,
                    change,
                    evaluator,
                    "the project name",
                )));
                return Ok(results);
            }
        };

        let resource_type = change
            .resource_type()
            .cloned()
            .unwrap_or_else(|| ResourceType::new(resource_types::CODEBUILD_PROJECT));
        let affected = AffectedResource::new(logical_id.clone(), resource_type)
            .with_physical_name(&project_name)
            .with_description(format!("Build project '{project_name}'"));

        let apply = build_apply(
            project_name,
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

async fn resolve_project_name(
    logical_id: &LogicalId,
    change: &ResourceDifference,
    evaluator: &Arc<dyn StackEvaluator>,
) -> Result<Option<String>> {
    if let Some(value) = change.new_value.as_ref().and_then(|d| d.property("Name")) {
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
    project_name: String,
    updates: BTreeMap<String, PropertyDifference>,
    evaluator: Arc<dyn StackEvaluator>,
    control: Arc<dyn ControlPlane>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let mut update = BuildProjectUpdate {
            project_name,
            source: None,
            environment: None,
            source_version: None,
        };

        if let Some(source) = new_value(&updates, "Source") {
            update.source = Some(evaluator.evaluate(source).await?);
        }
        if let Some(environment) = new_value(&updates, "Environment") {
            update.environment = Some(evaluator.evaluate(environment).await?);
        }
        if let Some(source_version) = new_value(&updates, "SourceVersion") {
            update.source_version = Some(evaluator.evaluate_to_string(source_version).await?);
        }

        control.update_build_project(update).await?;
        Ok(())
    })
}
