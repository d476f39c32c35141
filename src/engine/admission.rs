use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ulid::Ulid;

use crate::config::AdmissionConfig;
use crate::limits::*;
use crate::model::*;

use super::quota::WeekWindow;
use super::validate::{validate, Verdict};
use super::{Engine, EngineError, KeyRequest, LockKey, ReservationStore};

/// Why a candidate was turned away. Deterministic for a given store state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidInterval,
    Overlap { conflicting: ReservationId },
    QuotaExceeded { current: u32, limit: u32 },
}

impl Rejection {
    /// Suggested status for an HTTP layer.
    pub fn http_status(&self) -> u16 {
        match self {
            Rejection::InvalidInterval => 400,
            Rejection::Overlap { .. } => 409,
            Rejection::QuotaExceeded { .. } => 400,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::InvalidInterval => write!(f, "end time must be after start time"),
            Rejection::Overlap { conflicting } => {
                write!(f, "scheduling conflict with reservation {conflicting}")
            }
            Rejection::QuotaExceeded { current, limit } => write!(
                f,
                "customer already holds {current} reservations this week (limit {limit})"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Created(Reservation),
    Updated(Reservation),
    Rejected(Rejection),
}

impl AdmissionOutcome {
    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            AdmissionOutcome::Created(r) | AdmissionOutcome::Updated(r) => Some(r),
            AdmissionOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            AdmissionOutcome::Rejected(r) => Some(*r),
            _ => None,
        }
    }
}

fn rejection_of(verdict: Verdict) -> Option<Rejection> {
    match verdict {
        Verdict::Admitted => None,
        Verdict::RejectedInvalidInterval => Some(Rejection::InvalidInterval),
        Verdict::RejectedOverlap(conflicting) => Some(Rejection::Overlap { conflicting }),
        Verdict::RejectedQuotaExceeded { current, limit } => {
            Some(Rejection::QuotaExceeded { current, limit })
        }
    }
}

/// Result of one pass through the critical section.
enum Pass {
    Done(AdmissionOutcome),
    /// The update target left the slot we locked; resolve keys again.
    Moved,
}

/// Check and write under a held scope. Peers and counts are read here, never
/// before the scope, so no other admission on these keys can interleave.
/// `cancel` is checked last before the write: an abandoned request commits nothing.
async fn admit_in_scope<S: ReservationStore>(
    store: &S,
    candidate: &ReservationCandidate,
    update_of: Option<(ReservationId, (SpaceId, chrono::NaiveDate))>,
    config: &AdmissionConfig,
    cancel: &CancellationToken,
) -> Result<Pass, EngineError> {
    let space = store
        .get_space(candidate.space_id)
        .await?
        .ok_or(EngineError::NotFound(candidate.space_id))?;

    let excluding = update_of.map(|(id, _)| id);
    if let Some((id, locked_key)) = update_of {
        let current = store
            .get_reservation(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        if (current.space_id, current.date) != locked_key {
            return Ok(Pass::Moved);
        }
    }

    let peers = store
        .find_peers(candidate.space_id, candidate.date, excluding)
        .await?;
    let window = WeekWindow::containing(candidate.date);
    let week_count = store
        .count_in_week(&candidate.customer_email, window, excluding)
        .await?;

    let verdict = validate(candidate, &peers, week_count, config);
    if let Some(rejection) = rejection_of(verdict) {
        return Ok(Pass::Done(AdmissionOutcome::Rejected(rejection)));
    }
    if peers.len() >= MAX_RESERVATIONS_PER_SLOT_KEY {
        return Err(EngineError::LimitExceeded("too many reservations on space for date"));
    }
    if cancel.is_cancelled() {
        debug!(space_id = %candidate.space_id, "caller gone before commit, nothing written");
        return Err(EngineError::Cancelled);
    }

    let slot = candidate.slot()?;
    let reservation = Reservation {
        id: excluding.unwrap_or_else(Ulid::new),
        space_id: space.id,
        place_id: space.place_id,
        customer_email: candidate.customer_email.clone(),
        date: slot.date,
        span: slot.span,
    };
    let written = store.write_reservation(reservation).await?;
    Ok(Pass::Done(if excluding.is_some() {
        AdmissionOutcome::Updated(written)
    } else {
        AdmissionOutcome::Created(written)
    }))
}

impl<S: ReservationStore + 'static> Engine<S> {
    /// Admit a new reservation, or re-admit `update_of` with new values.
    ///
    /// Rejections come back as `Ok(Rejected(..))`. `Err` is reserved for
    /// missing references, contention (`LockTimeout`, the only retryable case)
    /// and store failures.
    pub async fn request_admission(
        &self,
        candidate: ReservationCandidate,
        update_of: Option<ReservationId>,
    ) -> Result<AdmissionOutcome, EngineError> {
        let start = Instant::now();
        let result = self.admit(candidate, update_of).await;
        metrics::histogram!(crate::observability::ADMISSION_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        metrics::counter!(
            crate::observability::ADMISSIONS_TOTAL,
            "outcome" => crate::observability::outcome_label(&result)
        )
        .increment(1);
        result
    }

    async fn admit(
        &self,
        candidate: ReservationCandidate,
        update_of: Option<ReservationId>,
    ) -> Result<AdmissionOutcome, EngineError> {
        if candidate.customer_email.is_empty() {
            return Err(EngineError::InvalidInput("customer email is required"));
        }
        if candidate.customer_email.len() > MAX_EMAIL_LEN {
            return Err(EngineError::LimitExceeded("customer email too long"));
        }
        // Malformed input never needs a lock.
        if candidate.slot().is_err() {
            debug!(space_id = %candidate.space_id, start = candidate.start, end = candidate.end, "rejected invalid interval");
            return Ok(AdmissionOutcome::Rejected(Rejection::InvalidInterval));
        }

        let week = WeekWindow::containing(candidate.date);
        let deadline = self.deadline();
        loop {
            let mut keys: Vec<KeyRequest> = vec![
                LockKey::Space(candidate.space_id).shared(),
                LockKey::slot(candidate.space_id, candidate.date).into(),
                LockKey::CustomerWeek {
                    email: candidate.customer_email.clone(),
                    week_start: week.start,
                }
                .into(),
            ];
            let target = match update_of {
                Some(id) => {
                    let current = self
                        .store
                        .get_reservation(id)
                        .await?
                        .ok_or(EngineError::NotFound(id))?;
                    keys.push(LockKey::slot(current.space_id, current.date).into());
                    Some((id, (current.space_id, current.date)))
                }
                None => None,
            };

            let scope = self.lock_keys(keys, deadline).await?;
            let store = self.store.clone();
            let config = self.config;
            let task_candidate = candidate.clone();
            let pass = run_scoped(scope, move |cancel| async move {
                admit_in_scope(&*store, &task_candidate, target, &config, &cancel).await
            })
            .await?;

            match pass {
                Pass::Done(outcome) => {
                    log_outcome(&candidate, &outcome);
                    return Ok(outcome);
                }
                Pass::Moved => {
                    debug!(reservation_id = ?update_of, "update target moved, retrying");
                }
            }
        }
    }

    /// Merge `patch` into the stored reservation and re-admit it.
    pub async fn patch_reservation(
        &self,
        id: ReservationId,
        patch: ReservationPatch,
    ) -> Result<AdmissionOutcome, EngineError> {
        let existing = self
            .store
            .get_reservation(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        self.request_admission(patch.apply_to(&existing), Some(id)).await
    }

    /// Remove a reservation. No validation, but serialized with admissions on its slot.
    pub async fn delete_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let deadline = self.deadline();
        loop {
            let current = self
                .store
                .get_reservation(id)
                .await?
                .ok_or(EngineError::NotFound(id))?;
            let key = (current.space_id, current.date);
            let scope = self.lock_keys([LockKey::slot(key.0, key.1)], deadline).await?;
            let store = self.store.clone();
            let removed = run_scoped(scope, move |cancel| async move {
                match store.get_reservation(id).await? {
                    None => Err(EngineError::NotFound(id)),
                    Some(r) if (r.space_id, r.date) != key => Ok(None),
                    Some(_) if cancel.is_cancelled() => Err(EngineError::Cancelled),
                    Some(_) => Ok(store.remove_reservation(id).await?),
                }
            })
            .await?;
            if let Some(removed) = removed {
                info!(reservation_id = %id, space_id = %removed.space_id, "reservation deleted");
                return Ok(removed);
            }
        }
    }
}

/// Run `work` on its own task that owns `scope`, so the scope outlives a
/// caller that goes away mid-flight and is released only after the work ends.
/// The token handed to `work` is cancelled when the caller drops this future.
async fn run_scoped<G, T, W, F>(scope: G, work: W) -> Result<T, EngineError>
where
    G: Send + 'static,
    T: Send + 'static,
    W: FnOnce(CancellationToken) -> F,
    F: std::future::Future<Output = Result<T, EngineError>> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let abandon = cancel.clone().drop_guard();
    let task = work(cancel);
    let result = tokio::spawn(async move {
        let _scope = scope;
        task.await
    })
    .await;
    abandon.disarm();
    result.map_err(|e| EngineError::Persistence(format!("admission task failed: {e}")))?
}

fn log_outcome(candidate: &ReservationCandidate, outcome: &AdmissionOutcome) {
    match outcome {
        AdmissionOutcome::Created(r) => {
            info!(reservation_id = %r.id, space_id = %r.space_id, date = %r.date, "reservation created")
        }
        AdmissionOutcome::Updated(r) => {
            info!(reservation_id = %r.id, space_id = %r.space_id, date = %r.date, "reservation updated")
        }
        AdmissionOutcome::Rejected(rejection) => info!(
            space_id = %candidate.space_id,
            date = %candidate.date,
            %rejection,
            "reservation rejected"
        ),
    }
}
