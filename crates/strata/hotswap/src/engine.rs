//! Hotswap engine - the entry point for hotswap attempts
//!
//! The engine wires the differ, the detector registry, and the executor
//! together behind a single `try_hotswap` call, and publishes progress on
//! a broadcast channel callers can subscribe to.

use crate::builder;
use crate::detectors::DetectorRegistry;
use crate::diff::{StructuralTemplateDiffer, TemplateDiffer};
use crate::error::Result;
use crate::executor::{HotswapExecutor, DEFAULT_APPLY_CONCURRENCY};
use crate::plan::AppliedOperation;
use crate::report;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_cloud::{ControlPlane, StackEvaluator};
use strata_types::{
    EventSource, HotswapEvent, HotswapEventEnvelope, HotswapMode, HotswapPropertyOverrides,
    LogicalId, NestedStackTemplates, RejectedChange, Template,
};
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Outcome of a hotswap attempt
#[derive(Debug)]
pub enum HotswapResult {
    /// Fall-back mode found non-hotswappable changes; nothing was applied
    /// and the caller should run a full deployment
    FallBack { rejected: Vec<RejectedChange> },

    /// The hotswappable subset was applied (`executed` is false when there
    /// was nothing to apply); `skipped` lists everything that was not
    Applied {
        applied: Vec<AppliedOperation>,
        skipped: Vec<RejectedChange>,
        executed: bool,
    },
}

/// Hotswap engine
pub struct HotswapEngine {
    control: Arc<dyn ControlPlane>,
    differ: Arc<dyn TemplateDiffer>,
    registry: Arc<DetectorRegistry>,
    concurrency: usize,
    event_tx: broadcast::Sender<HotswapEventEnvelope>,
}

impl HotswapEngine {
    /// Create an engine with the standard detector registry, the
    /// structural differ, and the default apply concurrency
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        let (event_tx, _) = broadcast::channel(4096);
        Self {
            control,
            differ: Arc::new(StructuralTemplateDiffer),
            registry: Arc::new(DetectorRegistry::standard()),
            concurrency: DEFAULT_APPLY_CONCURRENCY,
            event_tx,
        }
    }

    /// Replace the template differ
    pub fn with_differ(mut self, differ: Arc<dyn TemplateDiffer>) -> Self {
        self.differ = differ;
        self
    }

    /// Replace the detector registry
    pub fn with_registry(mut self, registry: DetectorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Bound the apply-phase concurrency
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Subscribe to hotswap progress events
    pub fn subscribe(&self) -> broadcast::Receiver<HotswapEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Attempt to hotswap the difference between the deployed and desired
    /// templates.
    ///
    /// In fall-back mode, any non-hotswappable change aborts the attempt
    /// before anything is applied. In hotswap-only mode, the hotswappable
    /// subset is applied and the rest is reported as skipped.
    #[instrument(
        skip(self, deployed, desired, nested_stacks, evaluator, overrides),
        fields(stack = %evaluator.stack_name(), mode = %mode)
    )]
    pub async fn try_hotswap(
        &self,
        mode: HotswapMode,
        deployed: &Template,
        desired: &Template,
        nested_stacks: &BTreeMap<LogicalId, NestedStackTemplates>,
        evaluator: Arc<dyn StackEvaluator>,
        overrides: &HotswapPropertyOverrides,
    ) -> Result<HotswapResult> {
        self.emit(HotswapEvent::HotswapStarted { mode }, EventSource::Engine);

        // 1. Compute the structural diff and classify every change
        let diff = self.differ.diff(deployed, desired);
        let plan = builder::classify_template_diff(
            diff,
            evaluator,
            &self.control,
            &self.registry,
            &self.differ,
            nested_stacks,
            overrides,
        )
        .await?;

        self.emit(
            HotswapEvent::PlanComputed {
                hotswappable: plan.hotswappable.len(),
                rejected: plan.rejected.len(),
            },
            EventSource::Planner,
        );

        // 2. Report what will be skipped, filtered for the active mode
        let messages = report::render_rejections(mode, &plan.rejected);
        if !messages.is_empty() {
            self.emit(
                HotswapEvent::ChangesSkipped { messages },
                EventSource::Reporter,
            );
        }

        // 3. In fall-back mode, any rejection aborts the whole attempt
        if mode == HotswapMode::FallBack && !plan.rejected.is_empty() {
            info!(
                rejected = plan.rejected.len(),
                "Not hotswapping; falling back to a full deployment"
            );
            self.emit(
                HotswapEvent::FallBackRequired {
                    rejected: plan.rejected.len(),
                },
                EventSource::Engine,
            );
            return Ok(HotswapResult::FallBack {
                rejected: plan.rejected,
            });
        }

        // 4. Apply the hotswappable subset
        let executed = !plan.hotswappable.is_empty();
        let executor = HotswapExecutor::new(self.control.clone(), self.event_tx.clone())
            .with_concurrency(self.concurrency);
        let applied = executor.apply_all(plan.hotswappable).await?;

        info!(applied = applied.len(), skipped = plan.rejected.len(), "Hotswap complete");
        self.emit(
            HotswapEvent::HotswapCompleted {
                applied: applied.len(),
            },
            EventSource::Engine,
        );

        Ok(HotswapResult::Applied {
            applied,
            skipped: plan.rejected,
            executed,
        })
    }

    fn emit(&self, event: HotswapEvent, source: EventSource) {
        let _ = self
            .event_tx
            .send(HotswapEventEnvelope::new(event, source));
    }
}
