//! In-memory control plane
//!
//! Suitable for development and testing. Records every call in submission
//! order, serves physical names and attributes from seeded maps, and
//! supports per-operation failure injection so error paths can be
//! exercised without a live environment.

use crate::control::{
    BuildProjectUpdate, ControlPlane, FunctionCodeUpdate, FunctionConfigurationUpdate,
    ServiceUpdate,
};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use strata_types::LogicalId;

/// One recorded control-plane invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    /// Operation name, e.g. `update_function_code`
    pub operation: String,
    /// Primary target of the call (name or ARN)
    pub target: String,
    /// Remaining arguments, serialized for assertions
    pub payload: Value,
}

/// Injected stabilization failure for a service wait
#[derive(Debug, Clone)]
struct StabilizationFailure {
    state: String,
    reason: String,
    observed_states: BTreeMap<String, u32>,
}

/// In-memory [`ControlPlane`] implementation
pub struct InMemoryControlPlane {
    calls: Mutex<Vec<ApiCall>>,
    markers: Mutex<Vec<String>>,
    physical_names: DashMap<String, String>,
    attributes: DashMap<String, String>,
    task_definition_revisions: DashMap<String, u32>,
    fail_operations: DashMap<String, String>,
    stabilization_failures: DashMap<String, StabilizationFailure>,
    operation_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            markers: Mutex::new(Vec::new()),
            physical_names: DashMap::new(),
            attributes: DashMap::new(),
            task_definition_revisions: DashMap::new(),
            fail_operations: DashMap::new(),
            stabilization_failures: DashMap::new(),
            operation_delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every operation for `delay` before completing, so tests can
    /// observe overlap between concurrent calls
    pub fn with_operation_delay(mut self, delay: Duration) -> Self {
        self.operation_delay = Some(delay);
        self
    }

    /// Seed the physical name served for a stack resource
    pub fn seed_physical_name(
        &self,
        stack_name: &str,
        logical_id: impl Into<LogicalId>,
        physical_name: impl Into<String>,
    ) {
        self.physical_names.insert(
            Self::resource_key(stack_name, &logical_id.into()),
            physical_name.into(),
        );
    }

    /// Seed the value served for a resource attribute
    pub fn seed_attribute(
        &self,
        stack_name: &str,
        logical_id: impl Into<LogicalId>,
        attribute: &str,
        value: impl Into<String>,
    ) {
        self.attributes.insert(
            format!("{}/{}", Self::resource_key(stack_name, &logical_id.into()), attribute),
            value.into(),
        );
    }

    /// Make the named operation fail with an API error
    pub fn fail_operation(&self, operation: &str, message: impl Into<String>) {
        self.fail_operations
            .insert(operation.to_string(), message.into());
    }

    /// Make `wait_service_stable` for this service fail with a
    /// stabilization timeout carrying the given observed-state tally
    pub fn fail_stabilization(
        &self,
        cluster: &str,
        service: &str,
        state: impl Into<String>,
        reason: impl Into<String>,
        observed_states: BTreeMap<String, u32>,
    ) {
        self.stabilization_failures.insert(
            format!("{cluster}/{service}"),
            StabilizationFailure {
                state: state.into(),
                reason: reason.into(),
                observed_states,
            },
        );
    }

    /// Every call recorded so far, in submission order
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Operation names recorded so far, in submission order
    pub fn operation_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }

    /// Currently active API markers
    pub fn active_markers(&self) -> Vec<String> {
        self.markers.lock().expect("markers lock").clone()
    }

    /// Highest number of operations observed in flight simultaneously
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn resource_key(stack_name: &str, logical_id: &LogicalId) -> String {
        format!("{stack_name}/{logical_id}")
    }

    async fn record(&self, operation: &str, target: &str, payload: Value) -> Result<()> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(delay) = self.operation_delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().expect("calls lock").push(ApiCall {
            operation: operation.to_string(),
            target: target.to_string(),
            payload,
        });

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = self.fail_operations.get(operation) {
            return Err(CloudError::Api {
                operation: operation.to_string(),
                target: target.to_string(),
                message: message.clone(),
            });
        }

        Ok(())
    }
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn update_function_code(
        &self,
        function_name: &str,
        code: FunctionCodeUpdate,
    ) -> Result<()> {
        self.record(
            "update_function_code",
            function_name,
            json!({
                "s3_bucket": code.s3_bucket,
                "s3_key": code.s3_key,
                "image_uri": code.image_uri,
                "zip_file": code.zip_file,
            }),
        )
        .await
    }

    async fn update_function_configuration(
        &self,
        function_name: &str,
        configuration: FunctionConfigurationUpdate,
    ) -> Result<()> {
        self.record(
            "update_function_configuration",
            function_name,
            json!({
                "environment": configuration.environment,
                "description": configuration.description,
                "layers": configuration.layers,
                "runtime": configuration.runtime,
                "handler": configuration.handler,
            }),
        )
        .await
    }

    async fn wait_function_updated(&self, function_name: &str) -> Result<()> {
        self.record("wait_function_updated", function_name, Value::Null)
            .await
    }

    async fn update_build_project(&self, update: BuildProjectUpdate) -> Result<()> {
        let payload = json!({
            "source": update.source,
            "environment": update.environment,
            "source_version": update.source_version,
        });
        self.record("update_build_project", &update.project_name, payload)
            .await
    }

    async fn register_task_definition(&self, family: &str, definition: Value) -> Result<String> {
        self.record("register_task_definition", family, definition)
            .await?;

        let mut revision = self
            .task_definition_revisions
            .entry(family.to_string())
            .or_insert(0);
        *revision += 1;
        Ok(format!(
            "arn:aws:ecs:us-east-1:111111111111:task-definition/{family}:{}",
            *revision
        ))
    }

    async fn update_service(&self, update: ServiceUpdate) -> Result<()> {
        self.record(
            "update_service",
            &format!("{}/{}", update.cluster, update.service),
            json!({
                "task_definition_arn": update.task_definition_arn,
                "force_new_deployment": update.force_new_deployment,
                "minimum_healthy_percent": update.minimum_healthy_percent,
                "maximum_healthy_percent": update.maximum_healthy_percent,
            }),
        )
        .await
    }

    async fn wait_service_stable(&self, cluster: &str, service: &str) -> Result<()> {
        let key = format!("{cluster}/{service}");
        self.record("wait_service_stable", &key, Value::Null).await?;

        if let Some(failure) = self.stabilization_failures.get(&key) {
            return Err(CloudError::StabilizationTimeout {
                resource: key.clone(),
                state: failure.state.clone(),
                reason: failure.reason.clone(),
                observed_states: failure.observed_states.clone(),
            });
        }
        Ok(())
    }

    async fn update_state_machine(
        &self,
        state_machine_arn: &str,
        definition: &str,
    ) -> Result<()> {
        self.record(
            "update_state_machine",
            state_machine_arn,
            json!({ "definition": definition }),
        )
        .await
    }

    async fn update_api_resolver(&self, resolver_arn: &str, properties: Value) -> Result<()> {
        self.record("update_api_resolver", resolver_arn, properties)
            .await
    }

    async fn update_api_function(&self, function_arn: &str, properties: Value) -> Result<()> {
        self.record("update_api_function", function_arn, properties)
            .await
    }

    async fn update_api_schema(&self, api_id: &str, definition: String) -> Result<()> {
        self.record(
            "update_api_schema",
            api_id,
            json!({ "definition": definition }),
        )
        .await
    }

    async fn update_api_key(&self, api_key_arn: &str, properties: Value) -> Result<()> {
        self.record("update_api_key", api_key_arn, properties).await
    }

    async fn describe_stack_resource(
        &self,
        stack_name: &str,
        logical_id: &LogicalId,
    ) -> Result<Option<String>> {
        let key = Self::resource_key(stack_name, logical_id);
        self.record("describe_stack_resource", &key, Value::Null)
            .await?;
        Ok(self.physical_names.get(&key).map(|n| n.clone()))
    }

    async fn resource_attribute(
        &self,
        stack_name: &str,
        logical_id: &LogicalId,
        attribute: &str,
    ) -> Result<String> {
        let key = format!("{}/{}", Self::resource_key(stack_name, logical_id), attribute);
        self.record("resource_attribute", &key, Value::Null).await?;
        self.attributes
            .get(&key)
            .map(|v| v.clone())
            .ok_or_else(|| CloudError::ResourceNotFound(key))
    }

    fn append_api_marker(&self, marker: &str) {
        self.markers
            .lock()
            .expect("markers lock")
            .push(marker.to_string());
    }

    fn remove_api_marker(&self, marker: &str) {
        let mut markers = self.markers.lock().expect("markers lock");
        if let Some(pos) = markers.iter().position(|m| m == marker) {
            markers.remove(pos);
        }
    }
}
