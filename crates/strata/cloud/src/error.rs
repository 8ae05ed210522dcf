//! Cloud environment error types

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors crossing the environment boundary
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("API call '{operation}' against '{target}' failed: {message}")]
    Api {
        operation: String,
        target: String,
        message: String,
    },

    #[error("resource '{0}' not found in stack")]
    ResourceNotFound(String),

    #[error("resource '{resource}' failed to stabilize: last state {state}, {reason}")]
    StabilizationTimeout {
        /// The resource being waited on
        resource: String,
        /// Last observed state
        state: String,
        /// Provider-supplied reason
        reason: String,
        /// Tally of intermediate states observed while waiting
        observed_states: BTreeMap<String, u32>,
    },

    #[error("could not evaluate expression: {0}")]
    Evaluation(String),
}

/// Result type for environment operations
pub type Result<T> = std::result::Result<T, CloudError>;
