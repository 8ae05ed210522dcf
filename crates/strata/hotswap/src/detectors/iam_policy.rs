//! IAM policy change detection
//!
//! Policies never update in place. The one carve-out: a policy whose roles
//! are referenced solely by bucket-deployment custom resources exists only
//! to support those deployments, so its change is ignored entirely rather
//! than rejected (the deployment itself already carries the rejection).

use super::{unsupported_resource_change, ChangeDetector};
use crate::error::Result;
use crate::plan::ClassifiedChange;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use strata_cloud::{ControlPlane, StackEvaluator};
use strata_types::{
    resource_types, HotswapPropertyOverrides, LogicalId, ResourceDifference,
};

/// Detector for IAM policies
pub struct IamPolicyDetector;

#[async_trait]
impl ChangeDetector for IamPolicyDetector {
    fn service(&self) -> &'static str {
        "iam-policy"
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

        if solely_supports_bucket_deployments(logical_id, change, evaluator) {
            return Ok(vec![]);
        }

        Ok(vec![ClassifiedChange::Rejected(
            unsupported_resource_change(logical_id, change, evaluator),
        )])
    }
}

/// A policy solely supports bucket deployments when every role it attaches
/// to is referenced only by bucket-deployment custom resources (and the
/// policy itself).
fn solely_supports_bucket_deployments(
    policy_logical_id: &LogicalId,
    change: &ResourceDifference,
    evaluator: &Arc<dyn StackEvaluator>,
) -> bool {
    let Some(roles) = change
        .new_value
        .as_ref()
        .and_then(|d| d.property("Roles"))
        .and_then(Value::as_array)
    else {
        return false;
    };
    if roles.is_empty() {
        return false;
    }

    roles.iter().all(|role| {
        // Only template-local roles can be traced; anything else rejects
        let Some(role_id) = role.get("Ref").and_then(Value::as_str) else {
            return false;
        };
        evaluator
            .references_to(&LogicalId::new(role_id))
            .iter()
            .filter(|reference| reference.logical_id != *policy_logical_id)
            .all(|reference| {
                reference.resource_type.as_str() == resource_types::BUCKET_DEPLOYMENT
            })
    })
}
