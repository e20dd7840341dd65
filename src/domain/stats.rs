use super::record::RecoveryRecord;
use super::status::{RecoveryStatus, resolve_status};
use serde::{Deserialize, Serialize};

/// One entry of the dashboard list.
///
/// `status` is carried for in-process consumers only; the wire format leaves
/// it to the client to derive from `retries` and `recovered`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPayment {
    pub invoice_id: String,
    pub customer_email: String,
    pub recovery_link: String,
    pub retries: u32,
    pub recovered: bool,
    #[serde(skip)]
    pub status: RecoveryStatus,
}

impl From<&RecoveryRecord> for FailedPayment {
    fn from(record: &RecoveryRecord) -> Self {
        Self {
            invoice_id: record.invoice_id.to_string(),
            customer_email: record.customer_email.clone(),
            recovery_link: record.recovery_link.clone(),
            retries: record.retry_count,
            recovered: record.recovered,
            status: resolve_status(record),
        }
    }
}

/// Aggregate view served on `GET /api/recover-stats`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_recovered: u64,
    pub retries: u64,
    pub failed_payments: Vec<FailedPayment>,
}

/// Running totals kept alongside the records.
///
/// Stores update these in the same commit as the record that changed them,
/// so they always equal [`StatsCounters::rescan`] over the stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsCounters {
    pub records: u64,
    pub total_recovered: u64,
    pub retries: u64,
}

impl StatsCounters {
    pub fn rescan<'a>(records: impl IntoIterator<Item = &'a RecoveryRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |mut counters, record| {
                counters.apply(None, record);
                counters
            })
    }

    /// Folds the change from `previous` to `next` into the totals.
    pub fn apply(&mut self, previous: Option<&RecoveryRecord>, next: &RecoveryRecord) {
        let (was_recovered, old_retries) = match previous {
            Some(previous) => (previous.recovered, previous.retry_count),
            None => {
                self.records += 1;
                (false, 0)
            }
        };
        if next.recovered && !was_recovered {
            self.total_recovered += 1;
        }
        self.retries += u64::from(next.retry_count.saturating_sub(old_retries));
    }
}

/// Full rescan of a record set, preserving its order.
pub fn compute_stats(records: &[RecoveryRecord]) -> Stats {
    let counters = StatsCounters::rescan(records);
    Stats {
        total_recovered: counters.total_recovered,
        retries: counters.retries,
        failed_payments: records.iter().map(FailedPayment::from).collect(),
    }
}
