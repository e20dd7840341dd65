//! Domain layer: recovery records, the events that move them, and the
//! status and statistics derived from them.

pub mod event;
pub mod ports;
pub mod record;
pub mod stats;
pub mod status;
