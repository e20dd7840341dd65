use super::record::RecoveryRecord;
use serde::Serialize;
use std::fmt;

/// Retry count at which an unrecovered invoice counts as failed and notified.
pub const RETRY_NOTIFY_THRESHOLD: u32 = 3;

/// Display status of a record. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RecoveryStatus {
    Recovered,
    #[serde(rename = "Failed, notified")]
    FailedNotified,
    #[default]
    Pending,
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecoveryStatus::Recovered => "Recovered",
            RecoveryStatus::FailedNotified => "Failed, notified",
            RecoveryStatus::Pending => "Pending",
        };
        f.write_str(label)
    }
}

/// Status for a `(recovered, retry_count)` pair.
pub fn status_for(recovered: bool, retry_count: u32) -> RecoveryStatus {
    if recovered {
        RecoveryStatus::Recovered
    } else if retry_count >= RETRY_NOTIFY_THRESHOLD {
        RecoveryStatus::FailedNotified
    } else {
        RecoveryStatus::Pending
    }
}

pub fn resolve_status(record: &RecoveryRecord) -> RecoveryStatus {
    status_for(record.recovered, record.retry_count)
}
