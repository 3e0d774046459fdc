//! Error types for the training layer.

use std::path::PathBuf;

use sensei_optimizer::OptimizerError;
use thiserror::Error;

/// Errors surfaced to whoever drives a [`crate::World`].
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error("failed to read config {}: {source}", .path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    ConfigJson(#[from] serde_json::Error),

    /// A config value is out of its valid range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The bias feature was never created.
    #[error("no bias feature; add a feature spec without prefixes")]
    MissingBias,

    #[error("lift fraction {0} is not in (0, 1]")]
    InvalidLiftFraction(f64),
}

/// A specialized Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;
