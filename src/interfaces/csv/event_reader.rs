use crate::domain::event::{EventRow, RecoveryEvent};
use crate::error::{RecoveryError, Result};
use std::io::Read;

/// Reads recovery events from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<RecoveryEvent>`.
/// It handles whitespace trimming and flexible record lengths automatically, so a
/// trailing empty `email` column may be omitted.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    /// Creates a new `EventReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and converts events.
    ///
    /// Each malformed row yields its own error; later rows are still read.
    pub fn events(self) -> impl Iterator<Item = Result<RecoveryEvent>> {
        self.reader.into_deserialize().map(|result| {
            let row: EventRow = result.map_err(RecoveryError::from)?;
            RecoveryEvent::try_from(row)
        })
    }
}
