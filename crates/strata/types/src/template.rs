//! Template model for CloudFormation-style stack documents
//!
//! Templates are consumed in their synthesized JSON form. Only the keys
//! the hotswap engine inspects are modeled; everything else rides along
//! inside property values untouched.

use crate::ids::{LogicalId, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single resource declaration within a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Resource type tag
    #[serde(rename = "Type")]
    pub resource_type: ResourceType,

    /// Resource properties, keyed by property name
    #[serde(rename = "Properties", default)]
    pub properties: serde_json::Map<String, Value>,

    /// Source-location trace attached by the synthesizer; diagnostics only,
    /// never consulted by classification
    #[serde(rename = "Metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    /// Explicit ordering dependencies
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Value>,
}

impl ResourceDefinition {
    /// Create a definition with just a type and properties
    pub fn new(resource_type: impl Into<ResourceType>, properties: serde_json::Map<String, Value>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            metadata: None,
            depends_on: None,
        }
    }

    /// Look up a property by name
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// The construct path recorded by the synthesizer, if any
    pub fn construct_path(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("aws:cdk:path"))
            .and_then(Value::as_str)
    }
}

/// A deployable stack template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template parameters
    #[serde(rename = "Parameters", default)]
    pub parameters: serde_json::Map<String, Value>,

    /// Declared resources, keyed by logical ID
    #[serde(rename = "Resources", default)]
    pub resources: BTreeMap<LogicalId, ResourceDefinition>,

    /// Stack outputs, keyed by output ID
    #[serde(rename = "Outputs", default)]
    pub outputs: BTreeMap<String, Value>,
}

impl Template {
    /// Parse a template from its JSON document form
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Look up a resource by logical ID
    pub fn resource(&self, logical_id: &LogicalId) -> Option<&ResourceDefinition> {
        self.resources.get(logical_id)
    }
}

/// Deployed and desired template pair for one nested stack, plus its own
/// children. Constructed fresh per deployment attempt; immutable during a
/// classification pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedStackTemplates {
    /// Physical name of the nested stack, absent when the stack has not
    /// been deployed yet
    pub physical_name: Option<String>,

    /// The currently-deployed template
    pub deployed_template: Template,

    /// The newly generated (desired) template
    pub generated_template: Template,

    /// Nested stacks declared within this one
    pub nested_stack_templates: BTreeMap<LogicalId, NestedStackTemplates>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_template_parses_synthesized_json() {
        let template = Template::from_value(json!({
            "Parameters": { "Stage": { "Type": "String" } },
            "Resources": {
                "Fn1": {
                    "Type": "AWS::Lambda::Function",
                    "Properties": { "Code": { "S3Key": "a" } },
                    "Metadata": { "aws:cdk:path": "Stack/Fn1/Resource" }
                }
            },
            "Outputs": { "FnArn": { "Value": { "Fn::GetAtt": ["Fn1", "Arn"] } } }
        }))
        .unwrap();

        let fn1 = template.resource(&LogicalId::new("Fn1")).unwrap();
        assert_eq!(fn1.resource_type.as_str(), "AWS::Lambda::Function");
        assert_eq!(fn1.construct_path(), Some("Stack/Fn1/Resource"));
        assert!(template.outputs.contains_key("FnArn"));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let template = Template::from_value(json!({})).unwrap();
        assert!(template.resources.is_empty());
        assert!(template.outputs.is_empty());
    }
}
