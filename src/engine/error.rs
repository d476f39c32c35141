use std::time::Duration;

use ulid::Ulid;

use crate::model::Ms;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed slot; the caller has to fix the request.
    InvalidInterval { start: Ms, end: Ms },
    /// Required field missing or empty.
    InvalidInput(&'static str),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Place still owns spaces.
    HasChildren(Ulid),
    /// Space still has reservations.
    HasReservations(Ulid),
    LimitExceeded(&'static str),
    /// Scope for the admission key could not be acquired in time.
    LockTimeout(Duration),
    /// The caller dropped the request before the write; nothing was stored.
    Cancelled,
    Persistence(String),
}

impl EngineError {
    /// Only contention is transient; everything else repeats on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::LockTimeout(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end})")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::HasChildren(id) => {
                write!(f, "cannot delete place {id}: has spaces")
            }
            EngineError::HasReservations(id) => {
                write!(f, "cannot delete space {id}: has reservations")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::LockTimeout(waited) => {
                write!(f, "busy: admission scope not acquired within {}ms", waited.as_millis())
            }
            EngineError::Cancelled => write!(f, "request abandoned before commit"),
            EngineError::Persistence(e) => write!(f, "persistence failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Failure reported by a `ReservationStore`.
#[derive(Debug)]
pub enum StoreError {
    Wal(String),
    Closed,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
            StoreError::Closed => write!(f, "store closed"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Persistence(e.to_string())
    }
}
