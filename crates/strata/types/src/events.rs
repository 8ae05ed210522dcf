//! Event types for hotswap observability
//!
//! Events provide a unified stream of hotswap lifecycle activities. The
//! engine never formats terminal output; it only publishes typed events.

use crate::change::HotswapMode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all hotswap events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotswapEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event source
    pub source: EventSource,

    /// Event severity
    pub severity: EventSeverity,

    /// The actual event
    pub event: HotswapEvent,
}

/// Event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// Top-level engine
    Engine,
    /// Change classification / plan building
    Planner,
    /// Operation execution
    Executor,
    /// Rejection reporting
    Reporter,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level event
    Debug,
    /// Informational event
    Info,
    /// Warning event
    Warning,
    /// Error event
    Error,
}

/// Hotswap events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HotswapEvent {
    /// A hotswap attempt began
    HotswapStarted { mode: HotswapMode },

    /// Classification finished
    PlanComputed {
        hotswappable: usize,
        rejected: usize,
    },

    /// Rendered explanations for skipped (non-hotswappable) changes,
    /// already filtered for the active mode
    ChangesSkipped { messages: Vec<String> },

    /// An operation's apply step was submitted
    OperationStarted {
        service: String,
        resources: Vec<String>,
    },

    /// An operation's apply step succeeded
    OperationCompleted {
        service: String,
        resources: Vec<String>,
    },

    /// An operation's apply step failed
    OperationFailed { service: String, reason: String },

    /// Every hotswappable operation was applied
    HotswapCompleted { applied: usize },

    /// Fall-back mode found non-hotswappable changes; the caller should
    /// run a full deployment instead
    FallBackRequired { rejected: usize },
}

impl HotswapEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: HotswapEvent, source: EventSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            source,
            severity: Self::infer_severity(&event),
            event,
        }
    }

    /// Infer severity from event type
    fn infer_severity(event: &HotswapEvent) -> EventSeverity {
        match event {
            HotswapEvent::OperationFailed { .. } => EventSeverity::Error,
            HotswapEvent::ChangesSkipped { .. } | HotswapEvent::FallBackRequired { .. } => {
                EventSeverity::Warning
            }
            _ => EventSeverity::Info,
        }
    }
}
