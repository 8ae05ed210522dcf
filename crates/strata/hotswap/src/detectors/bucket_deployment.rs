//! Bucket deployment custom resource detection
//!
//! Bucket deployments re-upload assets through a custom-resource provider;
//! there is no in-place update call to drive, so changes to them always
//! reject. The IAM policy that solely supports such a deployment is
//! handled (and ignored) by the policy detector instead.

use super::ChangeDetector;
use crate::error::Result;
use crate::plan::ClassifiedChange;
use async_trait::async_trait;
use std::sync::Arc;
use strata_cloud::{ControlPlane, StackEvaluator};
use strata_types::{
    resource_types, HotswapPropertyOverrides, LogicalId, NonHotswappableReason, RejectedChange,
    ResourceDifference, ResourceType,
};

/// Detector for bucket-deployment custom resources
pub struct BucketDeploymentDetector;

#[async_trait]
impl ChangeDetector for BucketDeploymentDetector {
    fn service(&self) -> &'static str {
        "s3-bucket-deployment"
    }

    async fn detect(
        &self,
        logical_id: &LogicalId,
        change: &ResourceDifference,
        evaluator: &Arc<dyn StackEvaluator>,
        _control: &Arc<dyn ControlPlane>,
        _overrides: &HotswapPropertyOverrides,
    ) -> Result<Vec<ClassifiedChange>> {
        if change.property_updates.is_empty() {
            return Ok(vec![]);
        }

        let resource_type = change
            .resource_type()
            .cloned()
            .unwrap_or_else(|| ResourceType::new(resource_types::BUCKET_DEPLOYMENT));

        Ok(vec![ClassifiedChange::Rejected(
            RejectedChange::resource(
                NonHotswappableReason::ResourceUnsupported,
                format!("resource '{logical_id}' is a bucket deployment; it cannot be hotswapped"),
                logical_id.clone(),
                resource_type,
                change.changed_property_names(),
            )
            .with_construct_path(evaluator.construct_path(logical_id)),
        )])
    }
}
