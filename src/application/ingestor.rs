use super::bounded;
use super::links::LinkGenerator;
use crate::config::LinkPolicy;
use crate::domain::event::RecoveryEvent;
use crate::domain::ports::{Mutation, RecordStoreRef, Upserted};
use crate::domain::record::{InvoiceId, RecoveryRecord, normalize_email};
use crate::error::{RecoveryError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// What ingesting an event did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum IngestOutcome {
    /// A new record was created for the invoice.
    Opened,
    #[serde(rename_all = "camelCase")]
    RetryRecorded { retry_count: u32 },
    Recovered,
    EmailCorrected,
    /// The event repeated state the record already had.
    Duplicate,
    /// The invoice is recovered; the event was acknowledged and dropped.
    IgnoredAfterRecovery,
}

impl IngestOutcome {
    pub fn changed_state(&self) -> bool {
        !matches!(
            self,
            IngestOutcome::Duplicate | IngestOutcome::IgnoredAfterRecovery
        )
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOutcome::Opened => f.write_str("opened"),
            IngestOutcome::RetryRecorded { retry_count } => {
                write!(f, "retry recorded ({retry_count})")
            }
            IngestOutcome::Recovered => f.write_str("recovered"),
            IngestOutcome::EmailCorrected => f.write_str("email corrected"),
            IngestOutcome::Duplicate => f.write_str("duplicate"),
            IngestOutcome::IgnoredAfterRecovery => f.write_str("ignored after recovery"),
        }
    }
}

/// Applies payment-lifecycle events to the record store.
///
/// Events for one invoice are applied in arrival order through the store's
/// per-key upsert; events for different invoices proceed independently.
/// Recovery is terminal: once a record is recovered nothing moves it again,
/// whatever order later events arrive in.
pub struct RecoveryIngestor {
    store: RecordStoreRef,
    links: Arc<dyn LinkGenerator>,
    link_policy: LinkPolicy,
    storage_timeout: Duration,
}

impl RecoveryIngestor {
    /// Creates a new `RecoveryIngestor`.
    ///
    /// # Arguments
    ///
    /// * `store` - The record store, shared with the query side.
    /// * `links` - Mints recovery links for new (and, per policy, retried) invoices.
    /// * `link_policy` - Whether retries replace the recovery link.
    /// * `storage_timeout` - Upper bound for each store call.
    pub fn new(
        store: RecordStoreRef,
        links: Arc<dyn LinkGenerator>,
        link_policy: LinkPolicy,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            links,
            link_policy,
            storage_timeout,
        }
    }

    /// Applies one event.
    ///
    /// Duplicates and events arriving after recovery are acknowledged with an
    /// `Ok` outcome. Retry, recovery and correction events for an invoice
    /// with no record fail with [`RecoveryError::UnknownInvoice`]; storage
    /// failures are returned as-is for the caller to retry.
    pub async fn ingest(&self, event: RecoveryEvent) -> Result<IngestOutcome> {
        let invoice_id = event.invoice_id().clone();
        let kind = event.kind();

        let result = self.apply(&invoice_id, event).await;
        match &result {
            Ok(IngestOutcome::Duplicate) => {
                tracing::info!(invoice_id = %invoice_id, event = %kind, "Duplicate event acknowledged");
            }
            Ok(IngestOutcome::IgnoredAfterRecovery) => {
                tracing::debug!(invoice_id = %invoice_id, event = %kind, "Event after recovery ignored");
            }
            Ok(outcome) => {
                tracing::info!(invoice_id = %invoice_id, event = %kind, outcome = %outcome, "Event applied");
            }
            Err(RecoveryError::UnknownInvoice(_)) => {
                tracing::warn!(invoice_id = %invoice_id, event = %kind, "Event for unknown invoice dropped");
            }
            Err(e) => {
                tracing::error!(invoice_id = %invoice_id, event = %kind, error = %e, "Failed to apply event");
            }
        }
        result
    }

    async fn apply(&self, invoice_id: &InvoiceId, event: RecoveryEvent) -> Result<IngestOutcome> {
        match event {
            RecoveryEvent::PaymentFailed { customer_email, .. } => {
                self.open(invoice_id, normalize_email(&customer_email)?).await
            }
            RecoveryEvent::RetryAttempted { .. } => self.retry(invoice_id).await,
            RecoveryEvent::PaymentRecovered { .. } => self.recover(invoice_id).await,
            RecoveryEvent::CustomerEmailCorrected { customer_email, .. } => {
                self.correct_email(invoice_id, normalize_email(&customer_email)?)
                    .await
            }
        }
    }

    async fn open(&self, invoice_id: &InvoiceId, customer_email: String) -> Result<IngestOutcome> {
        let links = Arc::clone(&self.links);
        let id = invoice_id.clone();
        let upserted = self
            .upsert(invoice_id, move |previous| {
                if previous.is_some() {
                    return Ok(Mutation::Skip);
                }
                let link = links.generate(&id)?;
                Ok(Mutation::Write(RecoveryRecord::open(
                    id,
                    customer_email,
                    link,
                    OffsetDateTime::now_utc(),
                )))
            })
            .await?;

        Ok(if upserted.previous.is_some() {
            IngestOutcome::Duplicate
        } else {
            IngestOutcome::Opened
        })
    }

    async fn retry(&self, invoice_id: &InvoiceId) -> Result<IngestOutcome> {
        let regenerate = self.link_policy == LinkPolicy::PerRetry;
        let links = Arc::clone(&self.links);
        let id = invoice_id.clone();
        let upserted = self
            .upsert(invoice_id, move |previous| {
                let mut record = existing(previous, &id)?;
                if !record.register_retry(OffsetDateTime::now_utc()) {
                    if record.recovered {
                        return Ok(Mutation::Skip);
                    }
                    return Err(RecoveryError::InvariantViolation(format!(
                        "Retry count of {id} is saturated"
                    )));
                }
                if regenerate {
                    record.replace_link(links.generate(&id)?);
                }
                Ok(Mutation::Write(record))
            })
            .await?;

        let written = upserted.written();
        Ok(match upserted.current {
            Some(current) if written => IngestOutcome::RetryRecorded {
                retry_count: current.retry_count,
            },
            _ => IngestOutcome::IgnoredAfterRecovery,
        })
    }

    async fn recover(&self, invoice_id: &InvoiceId) -> Result<IngestOutcome> {
        let id = invoice_id.clone();
        let upserted = self
            .upsert(invoice_id, move |previous| {
                let mut record = existing(previous, &id)?;
                if record.mark_recovered(OffsetDateTime::now_utc()) {
                    Ok(Mutation::Write(record))
                } else {
                    Ok(Mutation::Skip)
                }
            })
            .await?;

        Ok(if upserted.written() {
            IngestOutcome::Recovered
        } else {
            IngestOutcome::Duplicate
        })
    }

    async fn correct_email(
        &self,
        invoice_id: &InvoiceId,
        customer_email: String,
    ) -> Result<IngestOutcome> {
        let id = invoice_id.clone();
        let upserted = self
            .upsert(invoice_id, move |previous| {
                let mut record = existing(previous, &id)?;
                if record.correct_email(customer_email, OffsetDateTime::now_utc()) {
                    Ok(Mutation::Write(record))
                } else {
                    Ok(Mutation::Skip)
                }
            })
            .await?;

        let was_recovered = upserted.previous.as_ref().is_some_and(|p| p.recovered);
        Ok(if was_recovered {
            IngestOutcome::IgnoredAfterRecovery
        } else if upserted.written() {
            IngestOutcome::EmailCorrected
        } else {
            IngestOutcome::Duplicate
        })
    }

    async fn upsert<F>(&self, invoice_id: &InvoiceId, mutator: F) -> Result<Upserted>
    where
        F: FnOnce(Option<&RecoveryRecord>) -> Result<Mutation> + Send + 'static,
    {
        bounded(
            "upsert",
            self.storage_timeout,
            self.store.upsert(invoice_id, Box::new(mutator)),
        )
        .await
    }
}

fn existing(previous: Option<&RecoveryRecord>, invoice_id: &InvoiceId) -> Result<RecoveryRecord> {
    previous
        .cloned()
        .ok_or_else(|| RecoveryError::UnknownInvoice(invoice_id.clone()))
}
