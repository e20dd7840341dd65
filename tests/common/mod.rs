#![allow(dead_code)]

use autorecover::application::links::LinkGenerator;
use autorecover::domain::event::RecoveryEvent;
use autorecover::domain::record::InvoiceId;
use autorecover::error::Result;
use rand::Rng;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// Link generator with predictable output: `https://pay.test/{invoice}/{n}`.
#[derive(Default)]
pub struct SequentialLinks {
    minted: AtomicU32,
}

impl LinkGenerator for SequentialLinks {
    fn generate(&self, invoice_id: &InvoiceId) -> Result<String> {
        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://pay.test/{invoice_id}/{n}"))
    }
}

pub fn invoice(id: &str) -> InvoiceId {
    InvoiceId::new(id).unwrap()
}

pub fn failed(id: &str, email: &str) -> RecoveryEvent {
    RecoveryEvent::PaymentFailed {
        invoice_id: invoice(id),
        customer_email: email.to_string(),
    }
}

pub fn retry(id: &str) -> RecoveryEvent {
    RecoveryEvent::RetryAttempted {
        invoice_id: invoice(id),
    }
}

pub fn recovered(id: &str) -> RecoveryEvent {
    RecoveryEvent::PaymentRecovered {
        invoice_id: invoice(id),
    }
}

/// Random lifecycle for `invoices` invoices: each one opens with a failure,
/// then gets a random mix of retries and at most a few recovery events.
pub fn random_lifecycles(invoices: usize, max_events: usize) -> Vec<RecoveryEvent> {
    let mut rng = rand::thread_rng();
    let mut events = Vec::new();

    for i in 1..=invoices {
        let id = format!("inv-{i}");
        events.push(failed(&id, &format!("customer{i}@example.com")));
        for _ in 0..rng.gen_range(0..=max_events) {
            if rng.gen_bool(0.2) {
                events.push(recovered(&id));
            } else {
                events.push(retry(&id));
            }
        }
    }
    events
}

pub fn write_events_csv(path: &Path, events: &[RecoveryEvent]) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["type", "invoice", "email"])?;

    for event in events {
        let email = match event {
            RecoveryEvent::PaymentFailed { customer_email, .. }
            | RecoveryEvent::CustomerEmailCorrected { customer_email, .. } => customer_email.as_str(),
            _ => "",
        };
        wtr.write_record([
            event.kind().to_string().as_str(),
            event.invoice_id().as_str(),
            email,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
