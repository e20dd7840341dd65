use crate::domain::record::InvoiceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = HashMap<InvoiceId, Arc<Mutex<()>>>;

/// One async mutex per invoice that is currently locked or waited on.
///
/// The table lock is only held while looking up or pruning an entry, never
/// across an await. An entry is removed as soon as its last holder or waiter
/// goes away, so the table only ever holds keys in active use.
#[derive(Default, Clone)]
pub struct KeyedLocks {
    table: Arc<StdMutex<LockTable>>,
}

/// Exclusive hold on one invoice key, released on drop.
pub struct KeyGuard {
    key: InvoiceId,
    table: Arc<StdMutex<LockTable>>,
    held: Option<OwnedMutexGuard<()>>,
}

fn lock_table(table: &StdMutex<LockTable>) -> MutexGuard<'_, LockTable> {
    // The table is left consistent by every critical section, so a poisoned
    // lock is still safe to use.
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &InvoiceId) -> KeyGuard {
        let lock = {
            let mut table = lock_table(&self.table);
            Arc::clone(table.entry(key.clone()).or_default())
        };
        // Built before the await so a cancelled wait still prunes the entry.
        let mut guard = KeyGuard {
            key: key.clone(),
            table: Arc::clone(&self.table),
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut table = lock_table(&self.table);
        // Holders and waiters each own a clone; only the table's own is left.
        if table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.key);
        }
    }
}
