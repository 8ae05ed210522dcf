//! Hotswap error types
//!
//! Only apply-phase failures surface here. Anything classification can
//! decide is returned as a `RejectedChange`, never as an error.

use strata_cloud::CloudError;
use thiserror::Error;

/// Hotswap errors
#[derive(Debug, Error)]
pub enum HotswapError {
    #[error("cloud API error: {0}")]
    Cloud(#[from] CloudError),

    /// A wait-for-stabilization step timed out; `summary` is the
    /// user-facing multi-line account of what was observed
    #[error("{summary}")]
    StabilizationFailed { resource: String, summary: String },

    #[error("unexpected internal state: {0}; this is likely a bug, please report it")]
    InvariantViolation(String),
}

/// Result type for hotswap operations
pub type Result<T> = std::result::Result<T, HotswapError>;
