use super::keyed_lock::KeyedLocks;
use crate::domain::ports::{Mutation, Mutator, RecordStore, StoreSnapshot, Upserted};
use crate::domain::record::{InvoiceId, RecoveryRecord};
use crate::domain::stats::StatsCounters;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing recovery records, keyed by invoice id.
pub const CF_RECORDS: &str = "records";
/// Column Family mapping a big-endian arrival sequence to an invoice id.
pub const CF_ARRIVAL: &str = "arrival";
/// Column Family for store-wide metadata such as the running counters.
pub const CF_META: &str = "meta";

const COUNTERS_KEY: &[u8] = b"counters";

struct CommitState {
    counters: StatsCounters,
    next_sequence: u64,
}

/// A persistent record store implementation using RocksDB.
///
/// Every commit writes the record, its arrival entry (for new records) and the
/// updated counters in a single `WriteBatch`, so a crash never exposes a
/// record without its counters or vice versa.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbRecordStore {
    db: Arc<DB>,
    locks: KeyedLocks,
    commit: Arc<Mutex<CommitState>>,
}

impl RocksDbRecordStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist and restores the
    /// running counters and the next arrival sequence.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_RECORDS, CF_ARRIVAL, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors).map_err(StorageError::from)?;
        let state = Self::restore(&db)?;

        Ok(Self {
            db: Arc::new(db),
            locks: KeyedLocks::new(),
            commit: Arc::new(Mutex::new(state)),
        })
    }

    fn restore(db: &DB) -> Result<CommitState> {
        let arrival = cf(db, CF_ARRIVAL)?;
        let next_sequence = match db.iterator_cf(arrival, IteratorMode::End).next() {
            Some(entry) => {
                let (key, _) = entry.map_err(StorageError::from)?;
                decode_sequence(&key)? + 1
            }
            None => 0,
        };

        let counters = match db
            .get_cf(cf(db, CF_META)?, COUNTERS_KEY)
            .map_err(StorageError::from)?
        {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(StorageError::from)?,
            None => {
                let records = read_records(db, |cf, key| db.get_cf(cf, key), |cf| {
                    db.iterator_cf(cf, IteratorMode::Start)
                        .map(|item| item.map(|(_, value)| value))
                        .collect()
                })?;
                StatsCounters::rescan(&records)
            }
        };

        Ok(CommitState {
            counters,
            next_sequence,
        })
    }

    fn load(&self, invoice_id: &InvoiceId) -> Result<Option<RecoveryRecord>> {
        let bytes = self
            .db
            .get_cf(cf(&self.db, CF_RECORDS)?, invoice_id.as_str())
            .map_err(StorageError::from)?;
        match bytes {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }
}

fn cf<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name).ok_or_else(|| {
        StorageError::Backend(format!("Column family `{name}` not found")).into()
    })
}

fn decode_sequence(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| {
        StorageError::Backend(format!("Malformed arrival key of {} bytes", key.len()))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

type Fetched = std::result::Result<Option<Vec<u8>>, rocksdb::Error>;
type Scanned = std::result::Result<Vec<Box<[u8]>>, rocksdb::Error>;

/// Reads every record in arrival order through the given accessors, which
/// lets the same walk run against the live DB or a snapshot.
fn read_records(
    db: &DB,
    fetch: impl Fn(&ColumnFamily, &[u8]) -> Fetched,
    scan_arrival: impl Fn(&ColumnFamily) -> Scanned,
) -> Result<Vec<RecoveryRecord>> {
    let records_cf = cf(db, CF_RECORDS)?;
    let invoice_ids = scan_arrival(cf(db, CF_ARRIVAL)?).map_err(StorageError::from)?;

    let mut records = Vec::with_capacity(invoice_ids.len());
    for invoice_id in invoice_ids {
        let bytes = fetch(records_cf, &invoice_id[..])
            .map_err(StorageError::from)?
            .ok_or_else(|| {
                StorageError::Backend(format!(
                    "Arrival entry `{}` has no record",
                    String::from_utf8_lossy(&invoice_id)
                ))
            })?;
        records.push(serde_json::from_slice(&bytes).map_err(StorageError::from)?);
    }
    Ok(records)
}

#[async_trait]
impl RecordStore for RocksDbRecordStore {
    async fn get(&self, invoice_id: &InvoiceId) -> Result<Option<RecoveryRecord>> {
        self.load(invoice_id)
    }

    async fn upsert(&self, invoice_id: &InvoiceId, mutator: Mutator) -> Result<Upserted> {
        let _guard = self.locks.acquire(invoice_id).await;
        let previous = self.load(invoice_id)?;

        let mutation = mutator(previous.as_ref())?.checked(invoice_id, previous.as_ref())?;
        let Mutation::Write(record) = mutation else {
            return Ok(Upserted {
                current: previous.clone(),
                previous,
            });
        };

        let mut state = self.commit.lock().await;
        let mut counters = state.counters;
        counters.apply(previous.as_ref(), &record);

        let mut batch = WriteBatch::default();
        batch.put_cf(
            cf(&self.db, CF_RECORDS)?,
            invoice_id.as_str(),
            serde_json::to_vec(&record).map_err(StorageError::from)?,
        );
        if previous.is_none() {
            batch.put_cf(
                cf(&self.db, CF_ARRIVAL)?,
                state.next_sequence.to_be_bytes(),
                invoice_id.as_str(),
            );
        }
        batch.put_cf(
            cf(&self.db, CF_META)?,
            COUNTERS_KEY,
            serde_json::to_vec(&counters).map_err(StorageError::from)?,
        );
        self.db.write(batch).map_err(StorageError::from)?;

        // In-memory state only advances once the batch is durable.
        state.counters = counters;
        if previous.is_none() {
            state.next_sequence += 1;
        }

        Ok(Upserted {
            previous,
            current: Some(record),
        })
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        let snapshot = self.db.snapshot();
        let records = read_records(
            &self.db,
            |cf, key| snapshot.get_cf(cf, key),
            |cf| {
                snapshot
                    .iterator_cf(cf, IteratorMode::Start)
                    .map(|item| item.map(|(_, value)| value))
                    .collect()
            },
        )?;
        let counters = match snapshot
            .get_cf(cf(&self.db, CF_META)?, COUNTERS_KEY)
            .map_err(StorageError::from)?
        {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(StorageError::from)?,
            None => StatsCounters::default(),
        };
        Ok(StoreSnapshot { records, counters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecoveryError;
    use tempfile::tempdir;
    use time::OffsetDateTime;

    fn id(value: &str) -> InvoiceId {
        InvoiceId::new(value).unwrap()
    }

    fn open_record(value: &str) -> Mutator {
        let invoice_id = id(value);
        Box::new(move |_| {
            Ok(Mutation::Write(RecoveryRecord::open(
                invoice_id,
                "a@x.com".to_string(),
                "https://pay.test/link".to_string(),
                OffsetDateTime::UNIX_EPOCH,
            )))
        })
    }

    fn recover() -> Mutator {
        Box::new(|previous| {
            let mut record = previous
                .cloned()
                .ok_or_else(|| RecoveryError::InvalidEvent("missing".to_string()))?;
            record.register_retry(OffsetDateTime::UNIX_EPOCH);
            record.mark_recovered(OffsetDateTime::UNIX_EPOCH);
            Ok(Mutation::Write(record))
        })
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDbRecordStore::open(dir.path()).expect("Failed to open RocksDB");

        // Verify CFs exist
        assert!(store.db.cf_handle(CF_RECORDS).is_some());
        assert!(store.db.cf_handle(CF_ARRIVAL).is_some());
        assert!(store.db.cf_handle(CF_META).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_record_store() {
        let dir = tempdir().unwrap();
        let store = RocksDbRecordStore::open(dir.path()).unwrap();

        store.upsert(&id("inv-1"), open_record("inv-1")).await.unwrap();
        store.upsert(&id("inv-1"), recover()).await.unwrap();

        let retrieved = store.get(&id("inv-1")).await.unwrap().unwrap();
        assert!(retrieved.recovered);
        assert_eq!(retrieved.retry_count, 1);
        assert!(store.get(&id("inv-2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_reopen_restores_order_and_counters() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDbRecordStore::open(dir.path()).unwrap();
            for name in ["inv-b", "inv-a"] {
                store.upsert(&id(name), open_record(name)).await.unwrap();
            }
            store.upsert(&id("inv-a"), recover()).await.unwrap();
        }

        let store = RocksDbRecordStore::open(dir.path()).unwrap();
        store.upsert(&id("inv-c"), open_record("inv-c")).await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        let ids: Vec<&str> = snapshot
            .records
            .iter()
            .map(|r| r.invoice_id.as_str())
            .collect();
        assert_eq!(ids, ["inv-b", "inv-a", "inv-c"]);
        assert_eq!(
            snapshot.counters,
            StatsCounters {
                records: 3,
                total_recovered: 1,
                retries: 1
            }
        );
        assert_eq!(snapshot.counters, StatsCounters::rescan(&snapshot.records));
    }

    #[tokio::test]
    async fn test_rocksdb_rejected_mutation_writes_nothing() {
        let dir = tempdir().unwrap();
        let store = RocksDbRecordStore::open(dir.path()).unwrap();
        store.upsert(&id("inv-1"), open_record("inv-1")).await.unwrap();
        store.upsert(&id("inv-1"), recover()).await.unwrap();

        let result = store.upsert(&id("inv-1"), open_record("inv-1")).await;
        assert!(matches!(result, Err(RecoveryError::InvariantViolation(_))));

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert!(snapshot.records[0].recovered);
    }

    #[tokio::test]
    async fn test_rocksdb_unknown_ids_leave_no_lock_entries() {
        let dir = tempdir().unwrap();
        let store = RocksDbRecordStore::open(dir.path()).unwrap();
        for i in 0..100 {
            let invoice_id = id(&format!("ghost-{i}"));
            let unknown = invoice_id.clone();
            let result = store
                .upsert(
                    &invoice_id,
                    Box::new(move |_| Err(RecoveryError::UnknownInvoice(unknown))),
                )
                .await;
            assert!(result.is_err());
        }
        store.upsert(&id("inv-1"), open_record("inv-1")).await.unwrap();

        assert!(store.locks.is_empty());
        assert_eq!(store.snapshot().await.unwrap().records.len(), 1);
    }
}
