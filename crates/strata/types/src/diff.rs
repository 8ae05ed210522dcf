//! Structural-diff model between two stack templates
//!
//! A `TemplateDiff` is the input to hotswap classification. It is produced
//! by a template differ (see `strata-hotswap::diff`) and records, per
//! logical ID, what changed between the deployed and desired documents.

use crate::ids::{LogicalId, ResourceType};
use crate::template::ResourceDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Old/new pair for one changed property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDifference {
    /// Value in the deployed template, absent when the property was added
    pub old_value: Option<Value>,

    /// Value in the desired template, absent when the property was removed
    pub new_value: Option<Value>,
}

/// A single resource's transition between templates.
///
/// Exactly one of `old_value` / `new_value` may be absent (creation or
/// deletion), never both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDifference {
    /// Definition in the deployed template
    pub old_value: Option<ResourceDefinition>,

    /// Definition in the desired template
    pub new_value: Option<ResourceDefinition>,

    /// Changed properties, keyed by property name
    pub property_updates: BTreeMap<String, PropertyDifference>,
}

impl ResourceDifference {
    /// A resource present only in the desired template
    pub fn addition(new_value: ResourceDefinition) -> Self {
        Self {
            old_value: None,
            new_value: Some(new_value),
            property_updates: BTreeMap::new(),
        }
    }

    /// A resource present only in the deployed template
    pub fn removal(old_value: ResourceDefinition) -> Self {
        Self {
            old_value: Some(old_value),
            new_value: None,
            property_updates: BTreeMap::new(),
        }
    }

    /// A resource present in both templates with changed properties
    pub fn modification(
        old_value: ResourceDefinition,
        new_value: ResourceDefinition,
        property_updates: BTreeMap<String, PropertyDifference>,
    ) -> Self {
        Self {
            old_value: Some(old_value),
            new_value: Some(new_value),
            property_updates,
        }
    }

    pub fn is_addition(&self) -> bool {
        self.old_value.is_none()
    }

    pub fn is_removal(&self) -> bool {
        self.new_value.is_none()
    }

    /// The resource type, preferring the desired-side definition
    pub fn resource_type(&self) -> Option<&ResourceType> {
        self.new_value
            .as_ref()
            .or(self.old_value.as_ref())
            .map(|v| &v.resource_type)
    }

    /// Names of every changed property
    pub fn changed_property_names(&self) -> Vec<String> {
        self.property_updates.keys().cloned().collect()
    }
}

/// Old/new pair for one changed stack output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDifference {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Full structural difference between two templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDiff {
    /// Changed resources, keyed by logical ID
    pub resources: BTreeMap<LogicalId, ResourceDifference>,

    /// Changed outputs, keyed by output ID
    pub outputs: BTreeMap<String, OutputDifference>,
}

impl TemplateDiff {
    /// Whether the diff records no changes at all
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }
}
