use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};

use crate::model::*;
use crate::wal::Wal;

use super::error::StoreError;
use super::quota::WeekWindow;
use super::store::{InMemoryStore, ReservationStore};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends arriving together share one fsync:
/// take the first, drain whatever else is queued, flush once, answer all.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_other(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(other) = deferred {
            handle_other(&mut wal, other);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stray bytes do not leak into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_other(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

struct Shared {
    mem: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Commits hold it shared; compaction holds it exclusively so the snapshot
    /// and the log swap see the same set of events.
    gate: RwLock<()>,
}

impl Shared {
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    /// Log first, then apply. A failed append leaves memory untouched.
    async fn commit(&self, event: Event) -> Result<(), StoreError> {
        let _gate = self.gate.read().await;
        self.wal_append(&event).await?;
        self.mem.apply_event(&event);
        Ok(())
    }
}

/// Durable `ReservationStore`: an `InMemoryStore` rebuilt from, and kept in
/// step with, a group-committed write-ahead log.
#[derive(Clone)]
pub struct WalStore {
    shared: Arc<Shared>,
}

impl WalStore {
    /// Replay `path` and start the writer task. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let mem = InMemoryStore::new();
        for event in &events {
            mem.apply_event(event);
        }
        info!(path = %path.display(), events = events.len(), "replayed WAL");

        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            shared: Arc::new(Shared {
                mem,
                wal_tx,
                gate: RwLock::new(()),
            }),
        })
    }

    /// Commit on a detached task so a caller dropped mid-write cannot leave the
    /// log and memory disagreeing.
    async fn commit(&self, event: Event) -> Result<(), StoreError> {
        let shared = self.shared.clone();
        tokio::spawn(async move { shared.commit(event).await })
            .await
            .map_err(|e| StoreError::Wal(format!("commit task failed: {e}")))?
    }

    pub fn mem(&self) -> &InMemoryStore {
        &self.shared.mem
    }

    /// Rewrite the log as the minimal event set for the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.shared.gate.write().await;
        let events = self.shared.mem.snapshot();
        let kept = events.len();
        let (tx, rx) = oneshot::channel();
        self.shared
            .wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))?;
        info!(events = kept, "compacted WAL");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .shared
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Compact once `threshold` appends have piled up. Returns whether it ran.
    pub async fn maybe_compact(&self, threshold: u64) -> Result<bool, StoreError> {
        let appends = self.appends_since_compact().await;
        if appends < threshold {
            debug!(appends, threshold, "compaction not due");
            return Ok(false);
        }
        self.compact().await?;
        Ok(true)
    }
}

#[async_trait]
impl ReservationStore for WalStore {
    async fn find_peers(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
        excluding: Option<ReservationId>,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.mem().peers(space_id, date, excluding))
    }

    async fn count_in_week(
        &self,
        customer_email: &str,
        window: WeekWindow,
        excluding: Option<ReservationId>,
    ) -> Result<u32, StoreError> {
        Ok(self.mem().week_count(customer_email, &window, excluding))
    }

    async fn write_reservation(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        self.commit(Event::ReservationWritten(reservation.clone())).await?;
        Ok(reservation)
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.mem().reservation(&id))
    }

    async fn remove_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let Some(existing) = self.mem().reservation(&id) else {
            return Ok(None);
        };
        self.commit(Event::ReservationDeleted { id }).await?;
        Ok(Some(existing))
    }

    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.mem().all_reservations())
    }

    async fn count_for_space(&self, space_id: SpaceId) -> Result<usize, StoreError> {
        Ok(self.mem().load_of(&space_id))
    }

    async fn write_place(&self, place: Place) -> Result<(), StoreError> {
        self.commit(Event::PlaceWritten(place)).await
    }

    async fn get_place(&self, id: PlaceId) -> Result<Option<Place>, StoreError> {
        Ok(self.mem().place(&id))
    }

    async fn list_places(&self) -> Result<Vec<Place>, StoreError> {
        Ok(self.mem().all_places())
    }

    async fn remove_place(&self, id: PlaceId) -> Result<Option<Place>, StoreError> {
        let Some(existing) = self.mem().place(&id) else {
            return Ok(None);
        };
        self.commit(Event::PlaceDeleted { id }).await?;
        Ok(Some(existing))
    }

    async fn write_space(&self, space: Space) -> Result<(), StoreError> {
        self.commit(Event::SpaceWritten(space)).await
    }

    async fn get_space(&self, id: SpaceId) -> Result<Option<Space>, StoreError> {
        Ok(self.mem().space(&id))
    }

    async fn list_spaces(&self, place_id: Option<PlaceId>) -> Result<Vec<Space>, StoreError> {
        Ok(self.mem().spaces_of(place_id))
    }

    async fn remove_space(&self, id: SpaceId) -> Result<Option<Space>, StoreError> {
        let Some(existing) = self.mem().space(&id) else {
            return Ok(None);
        };
        self.commit(Event::SpaceDeleted { id }).await?;
        Ok(Some(existing))
    }
}
