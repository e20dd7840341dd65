use super::keyed_lock::KeyedLocks;
use crate::domain::ports::{Mutation, Mutator, RecordStore, StoreSnapshot, Upserted};
use crate::domain::record::{InvoiceId, RecoveryRecord};
use crate::domain::stats::StatsCounters;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Ledger {
    records: HashMap<InvoiceId, RecoveryRecord>,
    order: Vec<InvoiceId>,
    counters: StatsCounters,
}

impl Ledger {
    fn commit(&mut self, previous: Option<&RecoveryRecord>, record: RecoveryRecord) {
        self.counters.apply(previous, &record);
        if previous.is_none() {
            self.order.push(record.invoice_id.clone());
        }
        self.records.insert(record.invoice_id.clone(), record);
    }
}

/// A thread-safe in-memory record store.
///
/// Records, arrival order and running counters live behind one
/// `Arc<RwLock<..>>`, so a snapshot sees all three at the same instant.
/// Read-modify-write is serialized per invoice through [`KeyedLocks`].
/// Ideal for tests and for deployments that can rebuild state by replay.
#[derive(Default, Clone)]
pub struct InMemoryRecordStore {
    ledger: Arc<RwLock<Ledger>>,
    locks: KeyedLocks,
}

impl InMemoryRecordStore {
    /// Creates a new, empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, invoice_id: &InvoiceId) -> Result<Option<RecoveryRecord>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.records.get(invoice_id).cloned())
    }

    async fn upsert(&self, invoice_id: &InvoiceId, mutator: Mutator) -> Result<Upserted> {
        let _guard = self.locks.acquire(invoice_id).await;
        let previous = self.get(invoice_id).await?;

        let mutation = mutator(previous.as_ref())?.checked(invoice_id, previous.as_ref())?;
        let current = match mutation {
            Mutation::Skip => previous.clone(),
            Mutation::Write(record) => {
                // Dropping this future here leaves the ledger untouched.
                let mut ledger = self.ledger.write().await;
                ledger.commit(previous.as_ref(), record.clone());
                Some(record)
            }
        };

        Ok(Upserted { previous, current })
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        let ledger = self.ledger.read().await;
        let records = ledger
            .order
            .iter()
            .filter_map(|id| ledger.records.get(id).cloned())
            .collect();
        Ok(StoreSnapshot {
            records,
            counters: ledger.counters,
        })
    }
}
