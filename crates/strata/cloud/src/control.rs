//! Control-plane trait: typed live-update operations
//!
//! One method per provider operation the hotswap detectors invoke. The
//! trait deliberately models "invoke an update and await completion" and
//! nothing else; SDK plumbing, credentials, and retries live behind the
//! implementation.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use strata_types::LogicalId;

/// New code location for a function update. At least one field is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionCodeUpdate {
    pub s3_bucket: Option<String>,
    pub s3_key: Option<String>,
    pub image_uri: Option<String>,
    pub zip_file: Option<String>,
}

impl FunctionCodeUpdate {
    pub fn is_empty(&self) -> bool {
        self.s3_bucket.is_none()
            && self.s3_key.is_none()
            && self.image_uri.is_none()
            && self.zip_file.is_none()
    }
}

/// Configuration fields updatable in place on a function
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionConfigurationUpdate {
    pub environment: Option<Value>,
    pub description: Option<String>,
    pub layers: Option<Vec<String>>,
    pub runtime: Option<String>,
    pub handler: Option<String>,
}

impl FunctionConfigurationUpdate {
    pub fn is_empty(&self) -> bool {
        self.environment.is_none()
            && self.description.is_none()
            && self.layers.is_none()
            && self.runtime.is_none()
            && self.handler.is_none()
    }
}

/// In-place update for a build project
#[derive(Debug, Clone, PartialEq)]
pub struct BuildProjectUpdate {
    pub project_name: String,
    pub source: Option<Value>,
    pub environment: Option<Value>,
    pub source_version: Option<String>,
}

/// Point a container service at a new task-definition revision
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUpdate {
    pub cluster: String,
    pub service: String,
    pub task_definition_arn: String,
    pub force_new_deployment: bool,
    pub minimum_healthy_percent: Option<u32>,
    pub maximum_healthy_percent: Option<u32>,
}

/// Typed operations against the live environment.
///
/// The handle is shared read-only across concurrent operations; the API
/// markers are the only mutable diagnostic state, scoped append-before /
/// remove-after per call duration.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // --- Function service ---

    async fn update_function_code(&self, function_name: &str, code: FunctionCodeUpdate)
        -> Result<()>;

    async fn update_function_configuration(
        &self,
        function_name: &str,
        configuration: FunctionConfigurationUpdate,
    ) -> Result<()>;

    /// Await the function leaving its updating state
    async fn wait_function_updated(&self, function_name: &str) -> Result<()>;

    // --- Build service ---

    async fn update_build_project(&self, update: BuildProjectUpdate) -> Result<()>;

    // --- Container service ---

    /// Register a new task-definition revision; returns the revision ARN
    async fn register_task_definition(&self, family: &str, definition: Value) -> Result<String>;

    async fn update_service(&self, update: ServiceUpdate) -> Result<()>;

    /// Await service deployment stability
    async fn wait_service_stable(&self, cluster: &str, service: &str) -> Result<()>;

    // --- Workflow service ---

    async fn update_state_machine(&self, state_machine_arn: &str, definition: &str) -> Result<()>;

    // --- GraphQL API service ---

    async fn update_api_resolver(&self, resolver_arn: &str, properties: Value) -> Result<()>;

    async fn update_api_function(&self, function_arn: &str, properties: Value) -> Result<()>;

    async fn update_api_schema(&self, api_id: &str, definition: String) -> Result<()>;

    async fn update_api_key(&self, api_key_arn: &str, properties: Value) -> Result<()>;

    // --- Stack introspection ---

    /// Physical name of a deployed resource, if it exists
    async fn describe_stack_resource(
        &self,
        stack_name: &str,
        logical_id: &LogicalId,
    ) -> Result<Option<String>>;

    /// Resolve a resource attribute (e.g. `Arn`) of a deployed resource
    async fn resource_attribute(
        &self,
        stack_name: &str,
        logical_id: &LogicalId,
        attribute: &str,
    ) -> Result<String>;

    // --- Diagnostic API markers ---

    /// Append a marker tagging subsequent outbound calls. Markers are
    /// append-only for the duration of a call; concurrent operations must
    /// not clobber each other's markers.
    fn append_api_marker(&self, marker: &str);

    /// Remove a previously appended marker
    fn remove_api_marker(&self, marker: &str);
}
