use crate::domain::record::InvoiceId;
use std::time::Duration;
use thiserror::Error;

/// Failures of the durable record store.
///
/// A storage error never leaves a partially applied mutation behind: either
/// the whole commit is visible or none of it is.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage operation `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Unknown invoice: {0}")]
    UnknownInvoice(InvoiceId),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecoveryError {
    /// Whether the caller may retry the same event later with a chance of success.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RecoveryError::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
