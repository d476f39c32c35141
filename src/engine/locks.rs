use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::time::Instant;
use tracing::warn;

use crate::model::*;

use super::EngineError;

/// What an admission scope serializes on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    /// Existence of one space. Admissions share it; deleting the space takes it alone.
    Space(SpaceId),
    /// Overlap checks for one space on one date.
    Slot { space_id: SpaceId, date: NaiveDate },
    /// Quota checks for one customer in one Sunday-started week.
    CustomerWeek { email: String, week_start: NaiveDate },
}

impl LockKey {
    pub fn slot(space_id: SpaceId, date: NaiveDate) -> Self {
        LockKey::Slot { space_id, date }
    }

    pub fn shared(self) -> KeyRequest {
        KeyRequest {
            key: self,
            access: Access::Shared,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    Shared,
    Exclusive,
}

/// One key and how it is held. A bare `LockKey` converts to exclusive access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    pub key: LockKey,
    pub access: Access,
}

impl From<LockKey> for KeyRequest {
    fn from(key: LockKey) -> Self {
        KeyRequest {
            key,
            access: Access::Exclusive,
        }
    }
}

/// Per-key async read/write locks. Entries exist only while someone holds or awaits them.
#[derive(Default)]
pub struct KeyLocks {
    table: DashMap<LockKey, Arc<RwLock<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Lock every key, in sorted order, or fail once `deadline` passes.
    /// A key asked for twice is taken once, exclusively if either asks for that.
    /// Dropping the returned scope (or this future) releases whatever was taken.
    pub async fn acquire<R: Into<KeyRequest>>(
        self: &Arc<Self>,
        requests: impl IntoIterator<Item = R>,
        deadline: Instant,
        budget: Duration,
    ) -> Result<KeyScope, EngineError> {
        let mut requests: Vec<KeyRequest> = requests.into_iter().map(Into::into).collect();
        requests.sort_by(|a, b| a.key.cmp(&b.key).then(b.access.cmp(&a.access)));
        requests.dedup_by(|later, earlier| later.key == earlier.key);

        let mut scope = KeyScope {
            locks: self.clone(),
            keys: Vec::with_capacity(requests.len()),
            readers: Vec::new(),
            writers: Vec::new(),
        };
        let wait_start = Instant::now();
        for KeyRequest { key, access } in requests {
            let lock = self.table.entry(key.clone()).or_default().value().clone();
            scope.keys.push(key);
            let taken = match access {
                Access::Shared => tokio::time::timeout_at(deadline, lock.read_owned())
                    .await
                    .map(|guard| scope.readers.push(guard)),
                Access::Exclusive => tokio::time::timeout_at(deadline, lock.write_owned())
                    .await
                    .map(|guard| scope.writers.push(guard)),
            };
            if taken.is_err() {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL).increment(1);
                warn!(key = ?scope.keys.last(), "admission scope busy");
                return Err(EngineError::LockTimeout(budget));
            }
        }
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());
        Ok(scope)
    }
}

/// Held keys. Released on drop; table entries nobody else references go with them.
pub struct KeyScope {
    locks: Arc<KeyLocks>,
    keys: Vec<LockKey>,
    readers: Vec<OwnedRwLockReadGuard<()>>,
    writers: Vec<OwnedRwLockWriteGuard<()>>,
}

impl KeyScope {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for KeyScope {
    fn drop(&mut self) {
        self.readers.clear();
        self.writers.clear();
        for key in &self.keys {
            self.locks
                .table
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}
