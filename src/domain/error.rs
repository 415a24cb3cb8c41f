use thiserror::Error;

use crate::reliability::StorageError;

/// Top-level error type for the tracker.
///
/// Only construction and the binary surface return it; runtime failures of
/// the pipeline are reported through the delegate instead.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transmission error: {0}")]
    Transmission(String),

    #[error("Queue error: {0}")]
    Queue(String),
}
