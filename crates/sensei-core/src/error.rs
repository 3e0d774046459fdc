//! Error types for the Sensei core library.

use thiserror::Error;

/// Errors raised when validating values handed to the core from outside.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An old-to-new id mapping does not describe a stable compaction.
    #[error("invalid renumbering at j {j}: {reason}")]
    InvalidRenumbering {
        /// Old id at which the mapping went wrong.
        j: u32,
        /// What was wrong with it.
        reason: String,
    },
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
