//! Failed-payment recovery tracker.
//!
//! Keeps one [`RecoveryRecord`](domain::record::RecoveryRecord) per failed
//! invoice, applies payment-lifecycle events to it, and serves the aggregate
//! stats a recovery dashboard renders.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
