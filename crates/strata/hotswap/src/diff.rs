//! Template differ contract and structural implementation
//!
//! The engine consumes diffs through the [`TemplateDiffer`] trait so a
//! richer semantic differ can be plugged in. [`StructuralTemplateDiffer`]
//! is the default: resource- and property-level only, which is everything
//! classification consumes. Metadata-only edits are not surfaced; metadata
//! never affects classification.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use strata_types::{
    OutputDifference, PropertyDifference, ResourceDifference, Template, TemplateDiff,
};

/// Computes the structural difference between two templates
pub trait TemplateDiffer: Send + Sync {
    fn diff(&self, old_template: &Template, new_template: &Template) -> TemplateDiff;
}

/// Property-level structural differ
pub struct StructuralTemplateDiffer;

impl TemplateDiffer for StructuralTemplateDiffer {
    fn diff(&self, old_template: &Template, new_template: &Template) -> TemplateDiff {
        let mut diff = TemplateDiff::default();

        let logical_ids: BTreeSet<_> = old_template
            .resources
            .keys()
            .chain(new_template.resources.keys())
            .cloned()
            .collect();

        for logical_id in logical_ids {
            let old_value = old_template.resources.get(&logical_id);
            let new_value = new_template.resources.get(&logical_id);

            let difference = match (old_value, new_value) {
                (None, Some(new_value)) => ResourceDifference::addition(new_value.clone()),
                (Some(old_value), None) => ResourceDifference::removal(old_value.clone()),
                (Some(old_value), Some(new_value)) => {
                    let property_updates = diff_properties(
                        &old_value.properties,
                        &new_value.properties,
                    );
                    if property_updates.is_empty()
                        && old_value.resource_type == new_value.resource_type
                    {
                        continue;
                    }
                    ResourceDifference::modification(
                        old_value.clone(),
                        new_value.clone(),
                        property_updates,
                    )
                }
                (None, None) => continue,
            };
            diff.resources.insert(logical_id, difference);
        }

        let output_ids: BTreeSet<_> = old_template
            .outputs
            .keys()
            .chain(new_template.outputs.keys())
            .cloned()
            .collect();

        for output_id in output_ids {
            let old_value = old_template.outputs.get(&output_id);
            let new_value = new_template.outputs.get(&output_id);
            if old_value != new_value {
                diff.outputs.insert(
                    output_id,
                    OutputDifference {
                        old_value: old_value.cloned(),
                        new_value: new_value.cloned(),
                    },
                );
            }
        }

        diff
    }
}

fn diff_properties(
    old_properties: &serde_json::Map<String, Value>,
    new_properties: &serde_json::Map<String, Value>,
) -> BTreeMap<String, PropertyDifference> {
    let names: BTreeSet<_> = old_properties
        .keys()
        .chain(new_properties.keys())
        .cloned()
        .collect();

    names
        .into_iter()
        .filter_map(|name| {
            let old_value = old_properties.get(&name);
            let new_value = new_properties.get(&name);
            if old_value == new_value {
                return None;
            }
            Some((
                name,
                PropertyDifference {
                    old_value: old_value.cloned(),
                    new_value: new_value.cloned(),
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_types::LogicalId;

    fn template(value: Value) -> Template {
        Template::from_value(value).unwrap()
    }

    #[test]
    fn test_additions_removals_and_modifications() {
        let old = template(json!({
            "Resources": {
                "Keep": { "Type": "AWS::S3::Bucket", "Properties": { "Name": "a" } },
                "Gone": { "Type": "AWS::S3::Bucket" },
                "Edit": { "Type": "AWS::Lambda::Function", "Properties": { "Code": { "S3Key": "v1" }, "Handler": "index.main" } }
            }
        }));
        let new = template(json!({
            "Resources": {
                "Keep": { "Type": "AWS::S3::Bucket", "Properties": { "Name": "a" } },
                "Born": { "Type": "AWS::S3::Bucket" },
                "Edit": { "Type": "AWS::Lambda::Function", "Properties": { "Code": { "S3Key": "v2" }, "Handler": "index.main" } }
            }
        }));

        let diff = StructuralTemplateDiffer.diff(&old, &new);

        assert!(!diff.resources.contains_key(&LogicalId::new("Keep")));
        assert!(diff.resources[&LogicalId::new("Gone")].is_removal());
        assert!(diff.resources[&LogicalId::new("Born")].is_addition());

        let edit = &diff.resources[&LogicalId::new("Edit")];
        assert_eq!(edit.changed_property_names(), vec!["Code"]);
        assert_eq!(
            edit.property_updates["Code"].new_value,
            Some(json!({ "S3Key": "v2" }))
        );
    }

    #[test]
    fn test_metadata_only_edits_are_not_surfaced() {
        let old = template(json!({
            "Resources": {
                "Fn1": { "Type": "AWS::Lambda::Function", "Metadata": { "aws:cdk:path": "a" } }
            }
        }));
        let new = template(json!({
            "Resources": {
                "Fn1": { "Type": "AWS::Lambda::Function", "Metadata": { "aws:cdk:path": "b" } }
            }
        }));

        assert!(StructuralTemplateDiffer.diff(&old, &new).is_empty());
    }

    #[test]
    fn test_output_changes_are_recorded() {
        let old = template(json!({ "Outputs": { "Url": { "Value": "a" } } }));
        let new = template(json!({ "Outputs": { "Url": { "Value": "b" }, "Extra": { "Value": "c" } } }));

        let diff = StructuralTemplateDiffer.diff(&old, &new);
        assert_eq!(diff.outputs.len(), 2);
        assert_eq!(diff.outputs["Url"].old_value, Some(json!({ "Value": "a" })));
    }

    #[test]
    fn test_type_change_is_a_modification() {
        let old = template(json!({ "Resources": { "R": { "Type": "AWS::S3::Bucket" } } }));
        let new = template(json!({ "Resources": { "R": { "Type": "AWS::SQS::Queue" } } }));

        let diff = StructuralTemplateDiffer.diff(&old, &new);
        let change = &diff.resources[&LogicalId::new("R")];
        assert!(!change.is_addition());
        assert!(!change.is_removal());
    }
}
