use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::*;

/// Sunday-to-Saturday window, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    /// The window holding `date`. Derived from the reservation's own date,
    /// not from when the request is made.
    pub fn containing(date: NaiveDate) -> Self {
        let back = u64::from(date.weekday().num_days_from_sunday());
        let start = date.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
        let end = start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Count `email`'s reservations dated inside `window`, skipping `excluding`.
pub fn count_in_week<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
    email: &str,
    window: &WeekWindow,
    excluding: Option<ReservationId>,
) -> u32 {
    let n = reservations
        .into_iter()
        .filter(|r| Some(r.id) != excluding)
        .filter(|r| r.customer_email == email && window.contains(r.date))
        .count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Strict less-than: with a limit of N the Nth reservation is the last one admitted.
pub fn within_quota(current: u32, limit: u32) -> bool {
    current < limit
}
