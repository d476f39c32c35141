use crate::engine::{AdmissionOutcome, EngineError, Rejection};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission requests. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "spacebook_admissions_total";

/// Histogram: admission latency in seconds, lock wait included.
pub const ADMISSION_DURATION_SECONDS: &str = "spacebook_admission_duration_seconds";

// ── USE metrics (contention, storage) ───────────────────────────

/// Histogram: time spent acquiring admission keys.
pub const LOCK_WAIT_SECONDS: &str = "spacebook_lock_wait_seconds";

/// Counter: scopes abandoned at the lock deadline.
pub const LOCK_TIMEOUTS_TOTAL: &str = "spacebook_lock_timeouts_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "spacebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "spacebook_wal_flush_batch_size";

/// Short label for the `outcome` dimension of `ADMISSIONS_TOTAL`.
pub fn outcome_label(result: &Result<AdmissionOutcome, EngineError>) -> &'static str {
    match result {
        Ok(AdmissionOutcome::Created(_)) => "created",
        Ok(AdmissionOutcome::Updated(_)) => "updated",
        Ok(AdmissionOutcome::Rejected(Rejection::InvalidInterval)) => "invalid_interval",
        Ok(AdmissionOutcome::Rejected(Rejection::Overlap { .. })) => "overlap",
        Ok(AdmissionOutcome::Rejected(Rejection::QuotaExceeded { .. })) => "quota_exceeded",
        Err(EngineError::LockTimeout(_)) => "busy",
        Err(EngineError::Persistence(_)) => "persistence_error",
        Err(_) => "error",
    }
}
