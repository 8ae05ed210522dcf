//! Hotswap executor
//!
//! Applies hotswappable operations with a bounded worker pool. Start
//! notifications follow submission order; execution interleaves. A failure
//! in one operation never cancels siblings already in flight: every task
//! settles before the first error is surfaced.

use crate::error::{HotswapError, Result};
use crate::plan::{AppliedOperation, HotswapOperation};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use strata_cloud::{CloudError, ControlPlane};
use strata_types::{EventSource, HotswapEvent, HotswapEventEnvelope};
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, info, warn};

/// Default bound on concurrently applied operations
pub const DEFAULT_APPLY_CONCURRENCY: usize = 10;

/// Applies hotswap operations against the live environment
pub struct HotswapExecutor {
    control: Arc<dyn ControlPlane>,
    concurrency: usize,
    events: broadcast::Sender<HotswapEventEnvelope>,
}

impl HotswapExecutor {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        events: broadcast::Sender<HotswapEventEnvelope>,
    ) -> Self {
        Self {
            control,
            concurrency: DEFAULT_APPLY_CONCURRENCY,
            events,
        }
    }

    /// Bound the number of operations in flight simultaneously
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Apply every operation. Returns the applied-operation summaries on
    /// success; on failure, the first error observed after all in-flight
    /// work has settled.
    pub async fn apply_all(&self, operations: Vec<HotswapOperation>) -> Result<Vec<AppliedOperation>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(operations.len());
        let mut applied = Vec::with_capacity(operations.len());

        debug!(
            operations = operations.len(),
            concurrency = self.concurrency,
            "Applying hotswap operations"
        );

        for operation in operations {
            let resources: Vec<String> = operation
                .affected_resources()
                .iter()
                .map(|r| r.logical_id.to_string())
                .collect();
            applied.push(AppliedOperation {
                service: operation.service().to_string(),
                resources: operation.affected_resources().to_vec(),
            });

            // Start notifications go out in submission order
            self.emit(HotswapEvent::OperationStarted {
                service: operation.service().to_string(),
                resources: resources.clone(),
            });

            let semaphore = semaphore.clone();
            let control = self.control.clone();
            let events = self.events.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    HotswapError::InvariantViolation("executor semaphore closed".into())
                })?;

                let service = operation.service().to_string();
                let marker = format!("hotswap:{service}");
                control.append_api_marker(&marker);
                let result = operation.apply().await;
                control.remove_api_marker(&marker);

                match result {
                    Ok(()) => {
                        info!(service = %service, resources = ?resources, "Hotswapped");
                        let _ = events.send(HotswapEventEnvelope::new(
                            HotswapEvent::OperationCompleted { service, resources },
                            EventSource::Executor,
                        ));
                        Ok(())
                    }
                    Err(err) => {
                        let err = reclassify_stabilization(err);
                        warn!(service = %service, error = %err, "Hotswap operation failed");
                        let _ = events.send(HotswapEventEnvelope::new(
                            HotswapEvent::OperationFailed {
                                service,
                                reason: err.to_string(),
                            },
                            EventSource::Executor,
                        ));
                        Err(err)
                    }
                }
            }));
        }

        // Account for every task's result before surfacing the first error
        let mut first_error = None;
        for handle in handles {
            let settled = match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(HotswapError::InvariantViolation(format!(
                    "hotswap operation task failed: {join_error}"
                ))),
            };
            if let Err(err) = settled {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(applied),
        }
    }

    fn emit(&self, event: HotswapEvent) {
        let _ = self
            .events
            .send(HotswapEventEnvelope::new(event, EventSource::Executor));
    }
}

/// Timeout/abort-class failures from a wait-for-stabilization step are
/// re-wrapped with a multi-line summary; everything else propagates
/// unchanged.
fn reclassify_stabilization(err: HotswapError) -> HotswapError {
    match err {
        HotswapError::Cloud(CloudError::StabilizationTimeout {
            resource,
            state,
            reason,
            observed_states,
        }) => {
            let summary = stabilization_summary(&resource, &state, &reason, &observed_states);
            HotswapError::StabilizationFailed { resource, summary }
        }
        other => other,
    }
}

fn stabilization_summary(
    resource: &str,
    state: &str,
    reason: &str,
    observed_states: &BTreeMap<String, u32>,
) -> String {
    let mut summary = format!("resource '{resource}' failed to stabilize");
    let _ = write!(summary, "\n  last state: {state}");
    let _ = write!(summary, "\n  reason: {reason}");
    if !observed_states.is_empty() {
        let tally = observed_states
            .iter()
            .map(|(state, count)| format!("{state} x{count}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(summary, "\n  observed states: {tally}");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::HotswapOperation;
    use std::time::Duration;
    use strata_cloud::InMemoryControlPlane;
    use strata_types::{AffectedResource, LogicalId, ResourceType};

    fn operation(
        service: &str,
        logical_id: &str,
        apply: futures::future::BoxFuture<'static, Result<()>>,
    ) -> HotswapOperation {
        HotswapOperation::new(
            service,
            vec![AffectedResource::new(
                LogicalId::new(logical_id),
                ResourceType::new("AWS::Lambda::Function"),
            )],
            apply,
        )
    }

    fn wait_op(control: &Arc<InMemoryControlPlane>, index: usize) -> HotswapOperation {
        let control = control.clone();
        let name = format!("fn-{index}");
        operation(
            "lambda-function",
            &name.clone(),
            Box::pin(async move {
                control.wait_function_updated(&name).await?;
                Ok(())
            }),
        )
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_the_concurrency_bound() {
        let control = Arc::new(
            InMemoryControlPlane::new().with_operation_delay(Duration::from_millis(20)),
        );
        let (events, _) = broadcast::channel(256);
        let executor =
            HotswapExecutor::new(control.clone(), events).with_concurrency(10);

        let operations: Vec<_> = (0..25).map(|i| wait_op(&control, i)).collect();
        executor.apply_all(operations).await.unwrap();

        assert_eq!(control.calls().len(), 25);
        assert!(
            control.max_in_flight() <= 10,
            "observed {} operations in flight",
            control.max_in_flight()
        );
    }

    #[tokio::test]
    async fn test_one_failure_surfaces_after_all_work_settles() {
        let control = Arc::new(InMemoryControlPlane::new());
        control.fail_operation("update_state_machine", "throttled");
        let (events, _) = broadcast::channel(256);
        let executor = HotswapExecutor::new(control.clone(), events);

        let failing = {
            let control = control.clone();
            operation(
                "stepfunctions-state-machine",
                "Machine1",
                Box::pin(async move {
                    control.update_state_machine("arn:machine", "{}").await?;
                    Ok(())
                }),
            )
        };
        let succeeding = {
            let control = control.clone();
            operation(
                "lambda-function",
                "Fn1",
                Box::pin(async move {
                    control.wait_function_updated("fn-1").await?;
                    Ok(())
                }),
            )
        };

        let err = executor
            .apply_all(vec![failing, succeeding])
            .await
            .unwrap_err();
        assert!(matches!(err, HotswapError::Cloud(_)));

        // The sibling operation still ran to completion
        assert!(control
            .operation_names()
            .contains(&"wait_function_updated".to_string()));
    }

    #[tokio::test]
    async fn test_stabilization_timeout_is_rewrapped_with_a_summary() {
        let control = Arc::new(InMemoryControlPlane::new());
        control.fail_stabilization(
            "prod-cluster",
            "web-service",
            "ACTIVE",
            "tasks kept failing health checks",
            [("PENDING".to_string(), 3), ("DRAINING".to_string(), 2)].into(),
        );
        let (events, _) = broadcast::channel(256);
        let executor = HotswapExecutor::new(control.clone(), events);

        let op = {
            let control = control.clone();
            operation(
                "ecs-service",
                "Service1",
                Box::pin(async move {
                    control
                        .wait_service_stable("prod-cluster", "web-service")
                        .await?;
                    Ok(())
                }),
            )
        };

        let err = executor.apply_all(vec![op]).await.unwrap_err();
        let HotswapError::StabilizationFailed { resource, summary } = err else {
            panic!("expected a stabilization failure, got {err:?}");
        };
        assert_eq!(resource, "prod-cluster/web-service");
        assert!(summary.contains("last state: ACTIVE"));
        assert!(summary.contains("tasks kept failing health checks"));
        assert!(summary.contains("PENDING x3"));
        assert!(summary.contains("DRAINING x2"));
    }

    #[tokio::test]
    async fn test_api_marker_is_scoped_to_the_call() {
        let control = Arc::new(InMemoryControlPlane::new());
        let (events, _) = broadcast::channel(256);
        let executor = HotswapExecutor::new(control.clone(), events);

        let markers_during = {
            let control_inner = control.clone();
            operation(
                "lambda-function",
                "Fn1",
                Box::pin(async move {
                    assert_eq!(
                        control_inner.active_markers(),
                        vec!["hotswap:lambda-function"]
                    );
                    Ok(())
                }),
            )
        };
        executor.apply_all(vec![markers_during]).await.unwrap();

        assert!(control.active_markers().is_empty());
    }

    #[tokio::test]
    async fn test_start_events_follow_submission_order() {
        let control = Arc::new(InMemoryControlPlane::new());
        let (events, mut receiver) = broadcast::channel(256);
        let executor = HotswapExecutor::new(control.clone(), events);

        let ops: Vec<_> = (0..3)
            .map(|i| {
                operation(
                    "lambda-function",
                    &format!("fn-{i}"),
                    Box::pin(async move { Ok(()) }),
                )
            })
            .collect();
        executor.apply_all(ops).await.unwrap();

        let mut started = Vec::new();
        while let Ok(envelope) = receiver.try_recv() {
            if let HotswapEvent::OperationStarted { resources, .. } = envelope.event {
                started.push(resources[0].clone());
            }
        }
        assert_eq!(started, vec!["fn-0", "fn-1", "fn-2"]);
    }
}
