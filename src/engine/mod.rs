mod admission;
mod catalog;
mod conflict;
mod durable;
mod error;
mod locks;
mod queries;
mod quota;
mod store;
mod validate;

pub use admission::{AdmissionOutcome, Rejection};
pub use conflict::{first_conflict, overlaps};
pub use durable::WalStore;
pub use error::{EngineError, StoreError};
pub use locks::{Access, KeyLocks, KeyRequest, KeyScope, LockKey};
pub use queries::WeekUsage;
pub use quota::{count_in_week, within_quota, WeekWindow};
pub use store::{InMemoryStore, ReservationStore};
pub use validate::{validate, Verdict};

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::{AdmissionConfig, Config};

/// Admission gateway over a `ReservationStore`.
///
/// Reservation writes go through `request_admission`, `patch_reservation` and
/// `delete_reservation` only; each runs under the key locks of the space, slots
/// and customer week it touches. Catalog changes serialize among themselves on
/// `catalog`; admissions never take it, and only `delete_space` contends with
/// them, through the space key.
pub struct Engine<S> {
    store: Arc<S>,
    config: AdmissionConfig,
    locks: Arc<KeyLocks>,
    catalog: Mutex<()>,
}

impl<S: ReservationStore + 'static> Engine<S> {
    pub fn new(store: Arc<S>, config: AdmissionConfig) -> Self {
        Self {
            store,
            config,
            locks: Arc::new(KeyLocks::new()),
            catalog: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Keys currently held or awaited. Zero when the engine is idle.
    pub fn active_lock_keys(&self) -> usize {
        self.locks.len()
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.lock_timeout
    }

    /// All of `requests`, bounded by `deadline`.
    pub(super) async fn lock_keys<R: Into<KeyRequest>>(
        &self,
        requests: impl IntoIterator<Item = R>,
        deadline: Instant,
    ) -> Result<KeyScope, EngineError> {
        self.locks
            .acquire(requests, deadline, self.config.lock_timeout)
            .await
    }
}

impl Engine<WalStore> {
    /// Durable engine rooted at `config.data_dir`. Must run inside a tokio runtime.
    pub fn open(config: &Config) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let store = WalStore::open(&config.wal_path())?;
        Ok(Self::new(Arc::new(store), config.admission))
    }
}
