//! Strongly-typed identifiers for template entities
//!
//! Logical IDs and resource type tags are template-scoped strings, wrapped
//! in newtype structs for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Template-scoped stable name of a resource, independent of its physical
/// cloud identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LogicalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Provider-assigned resource type tag, e.g. `AWS::Lambda::Function`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType(String);

impl ResourceType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this tag denotes a nested stack resource
    pub fn is_nested_stack(&self) -> bool {
        self.0 == resource_types::NESTED_STACK
    }

    /// Whether this tag denotes the synthesizer's metadata resource
    pub fn is_metadata(&self) -> bool {
        self.0 == resource_types::METADATA
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

/// Well-known resource type tags recognized by the hotswap engine
pub mod resource_types {
    pub const LAMBDA_FUNCTION: &str = "AWS::Lambda::Function";
    pub const CODEBUILD_PROJECT: &str = "AWS::CodeBuild::Project";
    pub const ECS_TASK_DEFINITION: &str = "AWS::ECS::TaskDefinition";
    pub const ECS_SERVICE: &str = "AWS::ECS::Service";
    pub const STATE_MACHINE: &str = "AWS::StepFunctions::StateMachine";
    pub const APPSYNC_RESOLVER: &str = "AWS::AppSync::Resolver";
    pub const APPSYNC_FUNCTION: &str = "AWS::AppSync::FunctionConfiguration";
    pub const APPSYNC_SCHEMA: &str = "AWS::AppSync::GraphQLSchema";
    pub const APPSYNC_API_KEY: &str = "AWS::AppSync::ApiKey";
    pub const IAM_POLICY: &str = "AWS::IAM::Policy";
    pub const BUCKET_DEPLOYMENT: &str = "Custom::CDKBucketDeployment";
    pub const NESTED_STACK: &str = "AWS::CloudFormation::Stack";
    pub const METADATA: &str = "AWS::CDK::Metadata";
}
