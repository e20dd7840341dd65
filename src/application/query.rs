use super::bounded;
use crate::domain::ports::RecordStoreRef;
use crate::domain::record::InvoiceId;
use crate::domain::stats::{FailedPayment, Stats};
use crate::domain::status::RecoveryStatus;
use crate::error::Result;
use serde::Serialize;
use std::time::Duration;

/// A single invoice as shown on its detail view, with the resolved status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub payment: FailedPayment,
    pub status: RecoveryStatus,
}

/// Read-only façade over the record store.
///
/// Nothing here mutates state, so a caller may drop any of these futures at
/// any point without side effects.
#[derive(Clone)]
pub struct QueryService {
    store: RecordStoreRef,
    storage_timeout: Duration,
}

impl QueryService {
    pub fn new(store: RecordStoreRef, storage_timeout: Duration) -> Self {
        Self {
            store,
            storage_timeout,
        }
    }

    /// Current aggregate stats.
    ///
    /// Totals come from the store's running counters, taken in the same read
    /// as the record list, so they always agree with the list returned.
    pub async fn get_stats(&self) -> Result<Stats> {
        let snapshot = bounded("snapshot", self.storage_timeout, self.store.snapshot()).await?;
        Ok(Stats {
            total_recovered: snapshot.counters.total_recovered,
            retries: snapshot.counters.retries,
            failed_payments: snapshot.records.iter().map(FailedPayment::from).collect(),
        })
    }

    pub async fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<InvoiceView>> {
        let record = bounded("get", self.storage_timeout, self.store.get(invoice_id)).await?;
        Ok(record.map(|record| {
            let payment = FailedPayment::from(&record);
            InvoiceView {
                status: payment.status,
                payment,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{Mutator, RecordStore, StoreSnapshot, Upserted};
    use crate::domain::record::RecoveryRecord;
    use crate::domain::stats::compute_stats;
    use crate::error::{RecoveryError, StorageError};
    use crate::infrastructure::in_memory::InMemoryRecordStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Never answers, to exercise the timeout contract.
    struct StalledStore;

    #[async_trait]
    impl RecordStore for StalledStore {
        async fn get(&self, _invoice_id: &InvoiceId) -> Result<Option<RecoveryRecord>> {
            std::future::pending().await
        }

        async fn upsert(&self, _invoice_id: &InvoiceId, _mutator: Mutator) -> Result<Upserted> {
            std::future::pending().await
        }

        async fn snapshot(&self) -> Result<StoreSnapshot> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_empty_store_stats() {
        let service = QueryService::new(Arc::new(InMemoryRecordStore::new()), Duration::from_secs(1));
        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats, Stats::default());
    }

    #[tokio::test]
    async fn test_stats_match_full_rescan() {
        use crate::application::ingestor::RecoveryIngestor;
        use crate::application::links::TokenLinkGenerator;
        use crate::config::LinkPolicy;
        use crate::domain::event::RecoveryEvent;

        let store: RecordStoreRef = Arc::new(InMemoryRecordStore::new());
        let ingestor = RecoveryIngestor::new(
            Arc::clone(&store),
            Arc::new(TokenLinkGenerator::new("https://pay.test").unwrap()),
            LinkPolicy::Once,
            Duration::from_secs(1),
        );
        for (i, retries) in [0u32, 2, 4].into_iter().enumerate() {
            let invoice_id = InvoiceId::new(format!("inv-{i}")).unwrap();
            ingestor
                .ingest(RecoveryEvent::PaymentFailed {
                    invoice_id: invoice_id.clone(),
                    customer_email: "a@x.com".to_string(),
                })
                .await
                .unwrap();
            for _ in 0..retries {
                ingestor
                    .ingest(RecoveryEvent::RetryAttempted {
                        invoice_id: invoice_id.clone(),
                    })
                    .await
                    .unwrap();
            }
        }
        ingestor
            .ingest(RecoveryEvent::PaymentRecovered {
                invoice_id: InvoiceId::new("inv-1").unwrap(),
            })
            .await
            .unwrap();

        let service = QueryService::new(Arc::clone(&store), Duration::from_secs(1));
        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats, compute_stats(&store.list().await.unwrap()));
        assert_eq!(stats.total_recovered, 1);
        assert_eq!(stats.retries, 6);

        let view = service
            .get_invoice(&InvoiceId::new("inv-2").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.status, RecoveryStatus::FailedNotified);
        assert_eq!(serde_json::to_value(&view).unwrap()["status"], "Failed, notified");

        assert!(
            service
                .get_invoice(&InvoiceId::new("inv-9").unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_stalled_store_times_out() {
        let service = QueryService::new(Arc::new(StalledStore), Duration::from_millis(20));
        let result = service.get_stats().await;
        assert!(matches!(
            result,
            Err(RecoveryError::Storage(StorageError::Timeout {
                operation: "snapshot",
                ..
            }))
        ));
    }
}
