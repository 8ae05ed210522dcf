//! Template evaluation against the currently-deployed stack
//!
//! The hotswap engine needs four things from a deployed stack: physical
//! names for logical IDs (live lookup, cached), a reverse-reference
//! search, intrinsic-expression evaluation, and construct-path metadata
//! for diagnostics. `StackEvaluator` is that contract; `TemplateEvaluator`
//! implements it over a template plus a [`ControlPlane`].

use crate::control::ControlPlane;
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_types::{LogicalId, ResourceDefinition, ResourceType, Template};
use tracing::debug;

/// A resource that references another one
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReference {
    pub logical_id: LogicalId,
    pub resource_type: ResourceType,
}

/// Read-only view of one deployment-target stack scope.
///
/// Nested stacks get their own scope via [`StackEvaluator::nested_scope`];
/// each recursive classification call receives an immutable slice, never a
/// shared mutable "current stack" variable.
#[async_trait]
pub trait StackEvaluator: Send + Sync {
    /// Name of the stack this scope evaluates against
    fn stack_name(&self) -> &str;

    /// The desired-template definition of a resource
    fn resource(&self, logical_id: &LogicalId) -> Option<ResourceDefinition>;

    /// Every resource whose definition references `logical_id`
    fn references_to(&self, logical_id: &LogicalId) -> Vec<ResourceReference>;

    /// Construct path recorded by the synthesizer, for diagnostics
    fn construct_path(&self, logical_id: &LogicalId) -> Option<String>;

    /// Current physical name of a deployed resource. May require a live
    /// lookup; results are cached per scope.
    async fn physical_name(&self, logical_id: &LogicalId) -> Result<Option<String>>;

    /// Resolve template intrinsic expressions against the live environment
    async fn evaluate(&self, value: &Value) -> Result<Value>;

    /// Evaluate and coerce to a string
    async fn evaluate_to_string(&self, value: &Value) -> Result<String> {
        match self.evaluate(value).await? {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    /// A fresh scope for a nested stack's physical name and template
    fn nested_scope(
        &self,
        physical_name: &str,
        generated_template: Template,
    ) -> Arc<dyn StackEvaluator>;
}

/// [`StackEvaluator`] over a desired template and a control plane
pub struct TemplateEvaluator {
    stack_name: String,
    template: Template,
    parameters: BTreeMap<String, String>,
    account: String,
    region: String,
    partition: String,
    control: Arc<dyn ControlPlane>,
    physical_names: DashMap<LogicalId, Option<String>>,
}

impl TemplateEvaluator {
    pub fn new(
        stack_name: impl Into<String>,
        template: Template,
        control: Arc<dyn ControlPlane>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            template,
            parameters: BTreeMap::new(),
            account: "111111111111".into(),
            region: "us-east-1".into(),
            partition: "aws".into(),
            control,
            physical_names: DashMap::new(),
        }
    }

    /// Set the deployed stack's parameter values
    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the target account and region
    pub fn with_environment(
        mut self,
        account: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        self.account = account.into();
        self.region = region.into();
        self
    }

    fn resolve_ref<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            if let Some(value) = self.parameters.get(target) {
                return Ok(Value::String(value.clone()));
            }

            match target {
                "AWS::AccountId" => return Ok(Value::String(self.account.clone())),
                "AWS::Region" => return Ok(Value::String(self.region.clone())),
                "AWS::Partition" => return Ok(Value::String(self.partition.clone())),
                "AWS::StackName" => return Ok(Value::String(self.stack_name.clone())),
                "AWS::URLSuffix" => return Ok(Value::String("amazonaws.com".into())),
                "AWS::NoValue" => return Ok(Value::Null),
                _ => {}
            }

            let logical_id = LogicalId::new(target);
            if self.template.resource(&logical_id).is_some() {
                return match self.physical_name(&logical_id).await? {
                    Some(name) => Ok(Value::String(name)),
                    None => Err(CloudError::Evaluation(format!(
                        "physical name of resource '{target}' is not available"
                    ))),
                };
            }

            Err(CloudError::Evaluation(format!(
                "reference to unknown parameter or resource '{target}'"
            )))
        })
    }

    fn resolve_get_att<'a>(&'a self, argument: &'a Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let (logical_id, attribute) = match argument {
                Value::Array(parts) if parts.len() == 2 => {
                    let id = parts[0].as_str().ok_or_else(|| {
                        CloudError::Evaluation("Fn::GetAtt logical ID must be a string".into())
                    })?;
                    let attr = parts[1].as_str().ok_or_else(|| {
                        CloudError::Evaluation("Fn::GetAtt attribute must be a string".into())
                    })?;
                    (id.to_string(), attr.to_string())
                }
                Value::String(joined) => match joined.split_once('.') {
                    Some((id, attr)) => (id.to_string(), attr.to_string()),
                    None => {
                        return Err(CloudError::Evaluation(format!(
                            "malformed Fn::GetAtt '{joined}'"
                        )))
                    }
                },
                other => {
                    return Err(CloudError::Evaluation(format!(
                        "malformed Fn::GetAtt argument: {other}"
                    )))
                }
            };

            let value = self
                .control
                .resource_attribute(&self.stack_name, &LogicalId::new(logical_id), &attribute)
                .await?;
            Ok(Value::String(value))
        })
    }

    fn resolve_sub<'a>(&'a self, argument: &'a Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let (body, overrides) = match argument {
                Value::String(body) => (body.clone(), Map::new()),
                Value::Array(parts) if parts.len() == 2 => {
                    let body = parts[0]
                        .as_str()
                        .ok_or_else(|| {
                            CloudError::Evaluation("Fn::Sub body must be a string".into())
                        })?
                        .to_string();
                    let overrides = parts[1]
                        .as_object()
                        .cloned()
                        .ok_or_else(|| {
                            CloudError::Evaluation("Fn::Sub variables must be an object".into())
                        })?;
                    (body, overrides)
                }
                other => {
                    return Err(CloudError::Evaluation(format!(
                        "malformed Fn::Sub argument: {other}"
                    )))
                }
            };

            let mut result = String::new();
            let mut rest = body.as_str();
            while let Some(start) = rest.find("${") {
                result.push_str(&rest[..start]);
                let after = &rest[start + 2..];
                let end = after.find('}').ok_or_else(|| {
                    CloudError::Evaluation(format!("unterminated substitution in '{body}'"))
                })?;
                let variable = &after[..end];
                rest = &after[end + 1..];

                // "${!x}" is the literal "${x}"
                if let Some(literal) = variable.strip_prefix('!') {
                    result.push_str("${");
                    result.push_str(literal);
                    result.push('}');
                    continue;
                }

                let substituted = if let Some(value) = overrides.get(variable) {
                    self.evaluate(value).await?
                } else if variable.contains('.') {
                    self.resolve_get_att(&Value::String(variable.to_string()))
                        .await?
                } else {
                    self.resolve_ref(variable).await?
                };
                match substituted {
                    Value::String(s) => result.push_str(&s),
                    other => result.push_str(&other.to_string()),
                }
            }
            result.push_str(rest);
            Ok(Value::String(result))
        })
    }

    fn evaluate_inner<'a>(&'a self, value: &'a Value) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            match value {
                Value::Array(items) => {
                    let mut evaluated = Vec::with_capacity(items.len());
                    for item in items {
                        evaluated.push(self.evaluate_inner(item).await?);
                    }
                    Ok(Value::Array(evaluated))
                }
                Value::Object(map) if map.len() == 1 => {
                    let (key, argument) = map.iter().next().expect("len checked");
                    match key.as_str() {
                        "Ref" => {
                            let target = argument.as_str().ok_or_else(|| {
                                CloudError::Evaluation("Ref target must be a string".into())
                            })?;
                            self.resolve_ref(target).await
                        }
                        "Fn::GetAtt" => self.resolve_get_att(argument).await,
                        "Fn::Sub" => self.resolve_sub(argument).await,
                        "Fn::Join" => {
                            let parts = argument.as_array().filter(|a| a.len() == 2).ok_or_else(
                                || CloudError::Evaluation("malformed Fn::Join argument".into()),
                            )?;
                            let delimiter = parts[0].as_str().ok_or_else(|| {
                                CloudError::Evaluation("Fn::Join delimiter must be a string".into())
                            })?;
                            let items = self.evaluate_inner(&parts[1]).await?;
                            let items = items.as_array().ok_or_else(|| {
                                CloudError::Evaluation("Fn::Join list must be an array".into())
                            })?;
                            let joined = items
                                .iter()
                                .map(|i| match i {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join(delimiter);
                            Ok(Value::String(joined))
                        }
                        "Fn::Split" => {
                            let parts = argument.as_array().filter(|a| a.len() == 2).ok_or_else(
                                || CloudError::Evaluation("malformed Fn::Split argument".into()),
                            )?;
                            let delimiter = parts[0].as_str().ok_or_else(|| {
                                CloudError::Evaluation(
                                    "Fn::Split delimiter must be a string".into(),
                                )
                            })?;
                            let target = self.evaluate_to_string(&parts[1]).await?;
                            Ok(Value::Array(
                                target
                                    .split(delimiter)
                                    .map(|s| Value::String(s.to_string()))
                                    .collect(),
                            ))
                        }
                        "Fn::Select" => {
                            let parts = argument.as_array().filter(|a| a.len() == 2).ok_or_else(
                                || CloudError::Evaluation("malformed Fn::Select argument".into()),
                            )?;
                            let index = parts[0].as_u64().ok_or_else(|| {
                                CloudError::Evaluation("Fn::Select index must be a number".into())
                            })? as usize;
                            let list = self.evaluate_inner(&parts[1]).await?;
                            let list = list.as_array().ok_or_else(|| {
                                CloudError::Evaluation("Fn::Select list must be an array".into())
                            })?;
                            list.get(index).cloned().ok_or_else(|| {
                                CloudError::Evaluation(format!(
                                    "Fn::Select index {index} out of bounds"
                                ))
                            })
                        }
                        other if other.starts_with("Fn::") => Err(CloudError::Evaluation(
                            format!("unsupported intrinsic '{other}'"),
                        )),
                        _ => {
                            let mut evaluated = Map::new();
                            for (k, v) in map {
                                evaluated.insert(k.clone(), self.evaluate_inner(v).await?);
                            }
                            Ok(Value::Object(evaluated))
                        }
                    }
                }
                Value::Object(map) => {
                    let mut evaluated = Map::new();
                    for (k, v) in map {
                        evaluated.insert(k.clone(), self.evaluate_inner(v).await?);
                    }
                    Ok(Value::Object(evaluated))
                }
                scalar => Ok(scalar.clone()),
            }
        })
    }

    fn value_references(value: &Value, target: &str) -> bool {
        match value {
            Value::Array(items) => items.iter().any(|i| Self::value_references(i, target)),
            Value::Object(map) => {
                if map.len() == 1 {
                    let (key, argument) = map.iter().next().expect("len checked");
                    match key.as_str() {
                        "Ref" => return argument.as_str() == Some(target),
                        "Fn::GetAtt" => match argument {
                            Value::Array(parts) => {
                                return parts.first().and_then(Value::as_str) == Some(target)
                            }
                            Value::String(joined) => {
                                return joined.split_once('.').map(|(id, _)| id) == Some(target)
                            }
                            _ => return false,
                        },
                        "Fn::Sub" => {
                            let body = match argument {
                                Value::String(body) => Some(body.as_str()),
                                Value::Array(parts) => parts.first().and_then(Value::as_str),
                                _ => None,
                            };
                            if let Some(body) = body {
                                if body.contains(&format!("${{{target}}}"))
                                    || body.contains(&format!("${{{target}."))
                                {
                                    return true;
                                }
                            }
                            return false;
                        }
                        _ => {}
                    }
                }
                map.values().any(|v| Self::value_references(v, target))
            }
            _ => false,
        }
    }
}

#[async_trait]
impl StackEvaluator for TemplateEvaluator {
    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    fn resource(&self, logical_id: &LogicalId) -> Option<ResourceDefinition> {
        self.template.resource(logical_id).cloned()
    }

    fn references_to(&self, logical_id: &LogicalId) -> Vec<ResourceReference> {
        let target = logical_id.as_str();
        self.template
            .resources
            .iter()
            .filter(|(id, _)| id.as_str() != target)
            .filter(|(_, definition)| {
                definition
                    .properties
                    .values()
                    .any(|v| Self::value_references(v, target))
                    || definition
                        .depends_on
                        .as_ref()
                        .is_some_and(|d| match d {
                            Value::String(s) => s == target,
                            Value::Array(items) => {
                                items.iter().any(|i| i.as_str() == Some(target))
                            }
                            _ => false,
                        })
            })
            .map(|(id, definition)| ResourceReference {
                logical_id: id.clone(),
                resource_type: definition.resource_type.clone(),
            })
            .collect()
    }

    fn construct_path(&self, logical_id: &LogicalId) -> Option<String> {
        self.template
            .resource(logical_id)
            .and_then(|r| r.construct_path())
            .map(str::to_string)
    }

    async fn physical_name(&self, logical_id: &LogicalId) -> Result<Option<String>> {
        if let Some(cached) = self.physical_names.get(logical_id) {
            return Ok(cached.clone());
        }

        let name = self
            .control
            .describe_stack_resource(&self.stack_name, logical_id)
            .await?;
        debug!(
            stack = %self.stack_name,
            logical_id = %logical_id,
            physical_name = ?name,
            "Resolved physical name"
        );
        self.physical_names.insert(logical_id.clone(), name.clone());
        Ok(name)
    }

    async fn evaluate(&self, value: &Value) -> Result<Value> {
        self.evaluate_inner(value).await
    }

    fn nested_scope(
        &self,
        physical_name: &str,
        generated_template: Template,
    ) -> Arc<dyn StackEvaluator> {
        Arc::new(TemplateEvaluator {
            stack_name: physical_name.to_string(),
            template: generated_template,
            parameters: self.parameters.clone(),
            account: self.account.clone(),
            region: self.region.clone(),
            partition: self.partition.clone(),
            control: self.control.clone(),
            physical_names: DashMap::new(),
        })
    }
}
