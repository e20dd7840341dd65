//! Application layer containing the recovery tracker's use cases.
//!
//! [`ingestor::RecoveryIngestor`] applies payment-lifecycle events to the
//! record store and [`query::QueryService`] serves the read side. Both talk to
//! storage only through the `RecordStore` port, and every store call is
//! bounded by a timeout so no caller waits forever.

pub mod ingestor;
pub mod links;
pub mod query;

use crate::error::{Result, StorageError};
use std::future::Future;
use std::time::Duration;

/// Runs a store operation, failing with [`StorageError::Timeout`] once `limit` elapses.
pub(crate) async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Storage operation timed out"
            );
            Err(StorageError::Timeout {
                operation,
                timeout: limit,
            }
            .into())
        }
    }
}
