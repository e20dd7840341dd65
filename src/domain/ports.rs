use super::record::{InvoiceId, RecoveryRecord};
use super::stats::StatsCounters;
use crate::error::{RecoveryError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// What a mutator decided to do with the record it was shown.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Write(RecoveryRecord),
    Skip,
}

impl Mutation {
    /// Validates the mutator's decision before a store commits it under `key`.
    pub fn checked(self, key: &InvoiceId, previous: Option<&RecoveryRecord>) -> Result<Self> {
        if let Mutation::Write(record) = &self {
            if &record.invoice_id != key {
                return Err(RecoveryError::InvariantViolation(format!(
                    "Record {} cannot be stored under key {}",
                    record.invoice_id, key
                )));
            }
            record.check_transition(previous)?;
        }
        Ok(self)
    }
}

/// Read-modify-write step run by [`RecordStore::upsert`] while the key is held.
pub type Mutator = Box<dyn FnOnce(Option<&RecoveryRecord>) -> Result<Mutation> + Send>;

/// Result of an upsert: the record before and after the mutator ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub previous: Option<RecoveryRecord>,
    pub current: Option<RecoveryRecord>,
}

impl Upserted {
    pub fn written(&self) -> bool {
        self.previous != self.current
    }
}

/// A consistent read of the whole store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    /// Records in insertion order.
    pub records: Vec<RecoveryRecord>,
    pub counters: StatsCounters,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, invoice_id: &InvoiceId) -> Result<Option<RecoveryRecord>>;

    /// Applies `mutator` to the current record for `invoice_id`.
    ///
    /// Calls for the same key run one at a time; calls for different keys do
    /// not wait on each other. If the mutator fails, or the commit fails, the
    /// stored state is unchanged.
    async fn upsert(&self, invoice_id: &InvoiceId, mutator: Mutator) -> Result<Upserted>;

    async fn snapshot(&self) -> Result<StoreSnapshot>;

    async fn list(&self) -> Result<Vec<RecoveryRecord>> {
        Ok(self.snapshot().await?.records)
    }
}

pub type RecordStoreRef = Arc<dyn RecordStore>;
pub type RecordStoreFactory = Box<dyn Fn() -> RecordStoreRef + Send + Sync>;
