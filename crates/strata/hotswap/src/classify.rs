//! Structural change classification
//!
//! First stage of the pipeline: the decisions that need no knowledge of
//! the resource type's semantics. Pure function; anything it cannot decide
//! is a candidate for a type-specific detector.

use strata_types::{
    LogicalId, NonHotswappableReason, RejectedChange, ResourceDifference, ResourceType,
};

/// Decide the structural rejections (creation, deletion, type change).
///
/// Returns `None` when the change is a candidate for type-specific
/// detection: both sides present with an unchanged resource type.
pub fn structural_rejection(
    logical_id: &LogicalId,
    change: &ResourceDifference,
) -> Option<RejectedChange> {
    match (&change.old_value, &change.new_value) {
        (None, Some(new_value)) => Some(RejectedChange::resource(
            NonHotswappableReason::ResourceCreation,
            format!("resource '{logical_id}' was created by this deployment"),
            logical_id.clone(),
            new_value.resource_type.clone(),
            vec![],
        )),
        (Some(old_value), None) => Some(RejectedChange::resource(
            NonHotswappableReason::ResourceDeletion,
            format!("resource '{logical_id}' was removed by this deployment"),
            logical_id.clone(),
            old_value.resource_type.clone(),
            vec![],
        )),
        (Some(old_value), Some(new_value))
            if old_value.resource_type != new_value.resource_type =>
        {
            Some(RejectedChange::resource(
                NonHotswappableReason::ResourceTypeChanged,
                format!(
                    "resource '{}' had its type changed from '{}' to '{}'",
                    logical_id, old_value.resource_type, new_value.resource_type,
                ),
                logical_id.clone(),
                new_value.resource_type.clone(),
                change.changed_property_names(),
            ))
        }
        (Some(_), Some(_)) => None,
        // The differ never produces a change with both sides absent
        (None, None) => Some(RejectedChange::resource(
            NonHotswappableReason::ResourceUnsupported,
            format!("resource '{logical_id}' has no definition on either side"),
            logical_id.clone(),
            ResourceType::new("Unknown"),
            vec![],
        )),
    }
}
