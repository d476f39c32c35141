use crate::config::AdmissionConfig;
use crate::model::*;

use super::conflict::first_conflict;
use super::quota::within_quota;

/// Result of the admission check. Evaluated interval → overlap → quota;
/// the first failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admitted,
    RejectedInvalidInterval,
    RejectedOverlap(ReservationId),
    RejectedQuotaExceeded { current: u32, limit: u32 },
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Verdict::Admitted)
    }
}

/// Pure decision over a snapshot. `peers` must already exclude the reservation
/// being updated; peers on another space or date are ignored.
pub fn validate(
    candidate: &ReservationCandidate,
    peers: &[Reservation],
    week_count: u32,
    config: &AdmissionConfig,
) -> Verdict {
    let slot = match candidate.slot() {
        Ok(slot) => slot,
        Err(_) => return Verdict::RejectedInvalidInterval,
    };
    if let Some(conflicting) = first_conflict(&slot, peers) {
        return Verdict::RejectedOverlap(conflicting);
    }
    let limit = config.max_reservations_per_week();
    if !within_quota(week_count, limit) {
        return Verdict::RejectedQuotaExceeded {
            current: week_count,
            limit,
        };
    }
    Verdict::Admitted
}
