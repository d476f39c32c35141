use crate::model::*;

/// Half-open overlap on the same space and date.
pub fn overlaps(a: &Slot, b: &Slot) -> bool {
    a.same_key(b) && a.span.overlaps(&b.span)
}

/// Earliest-starting peer that overlaps `candidate`, if any.
pub fn first_conflict(candidate: &Slot, peers: &[Reservation]) -> Option<ReservationId> {
    peers
        .iter()
        .filter(|peer| overlaps(candidate, &peer.slot()))
        .min_by_key(|peer| (peer.span.start, peer.id))
        .map(|peer| peer.id)
}
