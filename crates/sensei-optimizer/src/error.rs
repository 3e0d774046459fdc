//! Error types for the optimizers.

use thiserror::Error;

/// Errors returned when an optimizer is asked to run in an invalid setup.
///
/// Numerical trouble during a pass (loss going up, inertia overshooting) is
/// corrected and logged, never reported here.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// A required parameter was never set.
    #[error("{0} not set")]
    MissingParameter(&'static str),

    /// SGD only understands the base l1 and l2 terms.
    #[error("SGD does not support adaptive or at-weight-zero regularization")]
    UnsupportedRegularization,

    /// `maybe_reduce` ran before any `store_total_loss`.
    #[error("no total loss stored to compare against")]
    NoStoredLoss,

    /// SGD has no start learning rate.
    #[error("start learning rate has not been set")]
    MissingLearningRate,

    /// The training set has no rows.
    #[error("training data is empty")]
    EmptyTrainingData,
}

/// A specialized Result type for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;
