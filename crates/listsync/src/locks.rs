//! Per-listing mutual exclusion.
//!
//! Sync and publish on the same listing id are serialized by one async mutex
//! per id, held for the whole operation. Table entries exist only while
//! someone holds or waits for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use listsync_core::ListingId;

use crate::config::LockPolicy;
use crate::error::{EngineError, Result};

type LockTable = HashMap<ListingId, Arc<AsyncMutex<()>>>;

/// The lock table.
#[derive(Clone, Default)]
pub struct ListingLocks {
    table: Arc<Mutex<LockTable>>,
}

/// Exclusive access to one listing. Released on drop.
pub struct ListingGuard {
    id: ListingId,
    guard: Option<OwnedMutexGuard<()>>,
    lock: Arc<AsyncMutex<()>>,
    table: Arc<Mutex<LockTable>>,
}

impl ListingGuard {
    pub fn listing_id(&self) -> ListingId {
        self.id
    }
}

impl Drop for ListingGuard {
    fn drop(&mut self) {
        // unlock before deciding whether the entry is still wanted
        self.guard.take();
        release(&self.table, self.id, &self.lock);
    }
}

fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    // The table only holds Arcs; a poisoned guard still has a usable map.
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drop the table entry if `lock` is its only user besides the table itself.
fn release(table: &Mutex<LockTable>, id: ListingId, lock: &Arc<AsyncMutex<()>>) {
    let mut table = lock_table(table);
    let unused = table
        .get(&id)
        .map_or(false, |entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(lock) == 2);
    if unused {
        table.remove(&id);
    }
}

impl ListingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `id` under `policy`.
    ///
    /// Returns `Conflict` if the lock is taken (`Reject`) or stays taken for
    /// longer than `wait` (`Wait`).
    pub async fn acquire(
        &self,
        id: ListingId,
        policy: LockPolicy,
        wait: Duration,
    ) -> Result<ListingGuard> {
        let lock = lock_table(&self.table).entry(id).or_default().clone();

        let acquired = match policy {
            LockPolicy::Reject => lock.clone().try_lock_owned().ok(),
            LockPolicy::Wait => tokio::time::timeout(wait, lock.clone().lock_owned())
                .await
                .ok(),
        };

        match acquired {
            Some(guard) => Ok(ListingGuard {
                id,
                guard: Some(guard),
                lock,
                table: self.table.clone(),
            }),
            None => {
                tracing::debug!(listing_id = %id, ?policy, "listing lock contended");
                release(&self.table, id, &lock);
                Err(EngineError::Conflict(id))
            }
        }
    }

    /// Number of listings currently locked or awaited.
    pub fn active(&self) -> usize {
        lock_table(&self.table).len()
    }
}
