use super::record::InvoiceId;
use crate::error::{RecoveryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PaymentFailed,
    RetryAttempted,
    PaymentRecovered,
    CustomerEmailCorrected,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::PaymentFailed => "payment_failed",
            EventKind::RetryAttempted => "retry_attempted",
            EventKind::PaymentRecovered => "payment_recovered",
            EventKind::CustomerEmailCorrected => "customer_email_corrected",
        };
        f.write_str(name)
    }
}

/// A payment-lifecycle notification for one invoice.
///
/// The JSON form is internally tagged:
/// `{"type": "payment_failed", "invoiceId": "in_1", "customerEmail": "a@x.com"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryEvent {
    #[serde(rename_all = "camelCase")]
    PaymentFailed {
        invoice_id: InvoiceId,
        customer_email: String,
    },
    #[serde(rename_all = "camelCase")]
    RetryAttempted { invoice_id: InvoiceId },
    #[serde(rename_all = "camelCase")]
    PaymentRecovered { invoice_id: InvoiceId },
    #[serde(rename_all = "camelCase")]
    CustomerEmailCorrected {
        invoice_id: InvoiceId,
        customer_email: String,
    },
}

impl RecoveryEvent {
    pub fn invoice_id(&self) -> &InvoiceId {
        match self {
            RecoveryEvent::PaymentFailed { invoice_id, .. }
            | RecoveryEvent::RetryAttempted { invoice_id }
            | RecoveryEvent::PaymentRecovered { invoice_id }
            | RecoveryEvent::CustomerEmailCorrected { invoice_id, .. } => invoice_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            RecoveryEvent::PaymentFailed { .. } => EventKind::PaymentFailed,
            RecoveryEvent::RetryAttempted { .. } => EventKind::RetryAttempted,
            RecoveryEvent::PaymentRecovered { .. } => EventKind::PaymentRecovered,
            RecoveryEvent::CustomerEmailCorrected { .. } => EventKind::CustomerEmailCorrected,
        }
    }
}

/// One line of an event replay file: `type, invoice, email`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct EventRow {
    pub r#type: EventKind,
    pub invoice: String,
    pub email: Option<String>,
}

impl TryFrom<EventRow> for RecoveryEvent {
    type Error = RecoveryError;

    fn try_from(row: EventRow) -> Result<Self> {
        let invoice_id = InvoiceId::new(row.invoice)?;
        let email = || {
            row.email.clone().ok_or_else(|| {
                RecoveryError::InvalidEvent(format!(
                    "{} for {} requires an email",
                    row.r#type, invoice_id
                ))
            })
        };
        Ok(match row.r#type {
            EventKind::PaymentFailed => RecoveryEvent::PaymentFailed {
                customer_email: email()?,
                invoice_id,
            },
            EventKind::RetryAttempted => RecoveryEvent::RetryAttempted { invoice_id },
            EventKind::PaymentRecovered => RecoveryEvent::PaymentRecovered { invoice_id },
            EventKind::CustomerEmailCorrected => RecoveryEvent::CustomerEmailCorrected {
                customer_email: email()?,
                invoice_id,
            },
        })
    }
}
