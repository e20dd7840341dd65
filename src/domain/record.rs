use crate::error::{RecoveryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Identifier of a billing invoice.
///
/// Guaranteed non-empty and free of surrounding whitespace, so two events
/// naming the same invoice always resolve to the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceId(String);

impl InvoiceId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(RecoveryError::InvalidEvent(
                "Invoice id must not be empty".to_string(),
            ));
        }
        if trimmed.len() == value.len() {
            Ok(Self(value))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InvoiceId {
    type Error = RecoveryError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for InvoiceId {
    type Error = RecoveryError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<InvoiceId> for String {
    fn from(id: InvoiceId) -> Self {
        id.0
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates and normalizes a customer contact address.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(RecoveryError::InvalidEvent(
            "Customer email must not be empty".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(RecoveryError::InvalidEvent(format!(
            "Customer email `{email}` is not an address"
        )));
    }
    Ok(email.to_string())
}

/// Recovery state of a single failed invoice.
///
/// Created on the first payment failure and never deleted. `retry_count`
/// only grows and `recovered` flips at most once, from false to true.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RecoveryRecord {
    pub invoice_id: InvoiceId,
    pub customer_email: String,
    /// Link the customer follows to complete the payment. Never empty.
    pub recovery_link: String,
    pub retry_count: u32,
    pub recovered: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_event_at: OffsetDateTime,
}

impl RecoveryRecord {
    pub fn open(
        invoice_id: InvoiceId,
        customer_email: String,
        recovery_link: String,
        at: OffsetDateTime,
    ) -> Self {
        Self {
            invoice_id,
            customer_email,
            recovery_link,
            retry_count: 0,
            recovered: false,
            last_event_at: at,
        }
    }

    /// Counts one retry attempt. Returns false, leaving the record untouched,
    /// once the invoice is recovered or the count can no longer grow.
    pub fn register_retry(&mut self, at: OffsetDateTime) -> bool {
        if self.recovered {
            return false;
        }
        let Some(retry_count) = self.retry_count.checked_add(1) else {
            return false;
        };
        self.retry_count = retry_count;
        self.touch(at);
        true
    }

    /// Marks the invoice as paid. Returns false if it already was.
    pub fn mark_recovered(&mut self, at: OffsetDateTime) -> bool {
        if self.recovered {
            return false;
        }
        self.recovered = true;
        self.touch(at);
        true
    }

    /// Replaces the contact address. Recovered records and unchanged
    /// addresses are left alone.
    pub fn correct_email(&mut self, email: String, at: OffsetDateTime) -> bool {
        if self.recovered || self.customer_email == email {
            return false;
        }
        self.customer_email = email;
        self.touch(at);
        true
    }

    pub fn replace_link(&mut self, link: String) {
        self.recovery_link = link;
    }

    fn touch(&mut self, at: OffsetDateTime) {
        if at > self.last_event_at {
            self.last_event_at = at;
        }
    }

    /// Checks that `self` is a legal successor of `previous` (or a legal new record).
    pub fn check_transition(&self, previous: Option<&RecoveryRecord>) -> Result<()> {
        if self.recovery_link.is_empty() {
            return Err(RecoveryError::InvariantViolation(format!(
                "Record {} has an empty recovery link",
                self.invoice_id
            )));
        }
        let Some(previous) = previous else {
            return Ok(());
        };
        if previous.invoice_id != self.invoice_id {
            return Err(RecoveryError::InvariantViolation(format!(
                "Record {} cannot replace record {}",
                self.invoice_id, previous.invoice_id
            )));
        }
        if self.retry_count < previous.retry_count {
            return Err(RecoveryError::InvariantViolation(format!(
                "Retry count of {} would decrease from {} to {}",
                self.invoice_id, previous.retry_count, self.retry_count
            )));
        }
        if previous.recovered && !self.recovered {
            return Err(RecoveryError::InvariantViolation(format!(
                "Recovered invoice {} cannot revert",
                self.invoice_id
            )));
        }
        Ok(())
    }
}
