//! Training configuration.

use std::path::Path;

use sensei_core::concurrency::THREAD_COUNT;
use sensei_data::DEFAULT_MAX_SHARD_SIZE;
use sensei_optimizer::{Regularizations, SgdSchedule};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainingError};

/// Everything a [`crate::World`] needs besides data.
///
/// Missing JSON fields take their defaults.
///
/// # Example
///
/// ```
/// use sensei_training::TrainingConfig;
///
/// let config = TrainingConfig::from_json(r#"{
///     "regularizations": { "base": { "l1": 0.5 } },
///     "step_multiplier": 1.5,
///     "lift_fractions": [0.1]
/// }"#).unwrap();
/// assert_eq!(config.regularizations.base.l1, 0.5);
/// assert_eq!(config.thread_count, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub regularizations: Regularizations,
    pub inertia_factor: f64,
    pub step_multiplier: f64,
    /// Revert a GradBoost step that increased the total loss.
    pub allow_undo: bool,
    /// Run every parallel loop sequentially and in order.
    pub deterministic: bool,
    pub thread_count: usize,
    /// Shard size limit in stored non-zeros.
    pub max_shard_size: u64,
    pub sgd: SgdSchedule,
    /// Fractions of top-scored rows at which lift is reported.
    pub lift_fractions: Vec<f64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            regularizations: Regularizations::default(),
            inertia_factor: 0.0,
            step_multiplier: 1.0,
            allow_undo: true,
            deterministic: false,
            thread_count: THREAD_COUNT,
            max_shard_size: DEFAULT_MAX_SHARD_SIZE,
            sgd: SgdSchedule::default(),
            lift_fractions: Vec::new(),
        }
    }
}

impl TrainingConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| TrainingError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(TrainingError::InvalidConfig(
                "thread_count must be positive".to_string(),
            ));
        }
        if self.inertia_factor < 0.0 {
            return Err(TrainingError::InvalidConfig(
                "inertia_factor must be non-negative".to_string(),
            ));
        }
        if self.step_multiplier < 1.0 {
            return Err(TrainingError::InvalidConfig(
                "step_multiplier must be at least 1".to_string(),
            ));
        }
        if self.max_shard_size == 0 {
            return Err(TrainingError::InvalidConfig(
                "max_shard_size must be positive".to_string(),
            ));
        }
        for &fraction in &self.lift_fractions {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(TrainingError::InvalidLiftFraction(fraction));
            }
        }
        Ok(())
    }
}
