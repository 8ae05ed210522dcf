//! Caller-supplied property overrides for hotswap operations
//!
//! One recognized namespace today: container-service rollout percentages.
//! Values are validated at construction, never silently clamped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid override values, raised at configuration-construction time
#[derive(Debug, Error)]
pub enum OverrideValidationError {
    #[error("minimumHealthyPercent must be a non-negative integer, got {0}")]
    NegativeMinimumHealthyPercent(i64),

    #[error("maximumHealthyPercent must be a non-negative integer, got {0}")]
    NegativeMaximumHealthyPercent(i64),
}

/// Rollout percentages applied when hotswapping container services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcsHotswapProperties {
    minimum_healthy_percent: u32,
    maximum_healthy_percent: Option<u32>,
}

impl EcsHotswapProperties {
    /// Validate and construct. `minimum_healthy_percent` defaults to 0 when
    /// absent; negative values are a hard input error.
    pub fn new(
        minimum_healthy_percent: Option<i64>,
        maximum_healthy_percent: Option<i64>,
    ) -> Result<Self, OverrideValidationError> {
        let minimum = minimum_healthy_percent.unwrap_or(0);
        if minimum < 0 {
            return Err(OverrideValidationError::NegativeMinimumHealthyPercent(
                minimum,
            ));
        }
        if let Some(maximum) = maximum_healthy_percent {
            if maximum < 0 {
                return Err(OverrideValidationError::NegativeMaximumHealthyPercent(
                    maximum,
                ));
            }
        }

        Ok(Self {
            minimum_healthy_percent: minimum as u32,
            maximum_healthy_percent: maximum_healthy_percent.map(|m| m as u32),
        })
    }

    pub fn minimum_healthy_percent(&self) -> u32 {
        self.minimum_healthy_percent
    }

    pub fn maximum_healthy_percent(&self) -> Option<u32> {
        self.maximum_healthy_percent
    }
}

impl Default for EcsHotswapProperties {
    fn default() -> Self {
        Self {
            minimum_healthy_percent: 0,
            maximum_healthy_percent: None,
        }
    }
}

/// All recognized hotswap property overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HotswapPropertyOverrides {
    /// Container-service rollout configuration
    pub ecs: Option<EcsHotswapProperties>,
}

impl HotswapPropertyOverrides {
    pub fn new(ecs: Option<EcsHotswapProperties>) -> Self {
        Self { ecs }
    }

    /// Effective container-service rollout configuration
    pub fn ecs_or_default(&self) -> EcsHotswapProperties {
        self.ecs.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_minimum_is_rejected_at_construction() {
        let err = EcsHotswapProperties::new(Some(-1), None).unwrap_err();
        assert!(matches!(
            err,
            OverrideValidationError::NegativeMinimumHealthyPercent(-1)
        ));
    }

    #[test]
    fn test_negative_maximum_is_rejected_at_construction() {
        let err = EcsHotswapProperties::new(Some(50), Some(-200)).unwrap_err();
        assert!(matches!(
            err,
            OverrideValidationError::NegativeMaximumHealthyPercent(-200)
        ));
    }

    #[test]
    fn test_minimum_defaults_to_zero() {
        let props = EcsHotswapProperties::new(None, Some(200)).unwrap();
        assert_eq!(props.minimum_healthy_percent(), 0);
        assert_eq!(props.maximum_healthy_percent(), Some(200));
    }
}
