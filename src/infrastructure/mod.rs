//! Storage backends for the [`RecordStore`](crate::domain::ports::RecordStore) port.

pub mod in_memory;
pub mod keyed_lock;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
