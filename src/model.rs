use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::*;

/// Milliseconds since local midnight of the owning date.
pub type Ms = i64;

pub type PlaceId = Ulid;
pub type SpaceId = Ulid;
pub type ReservationId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: Ms, end: Ms) -> Result<Self, EngineError> {
        if start >= end || start < 0 || end > DAY_MS {
            return Err(EngineError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A span pinned to one space on one calendar date.
/// Slots on different spaces or dates are never comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub space_id: SpaceId,
    pub date: NaiveDate,
    pub span: Span,
}

impl Slot {
    pub fn new(space_id: SpaceId, date: NaiveDate, start: Ms, end: Ms) -> Result<Self, EngineError> {
        if !is_supported_date(date) {
            return Err(EngineError::InvalidInterval { start, end });
        }
        let span = Span::try_new(start, end)?;
        Ok(Self { space_id, date, span })
    }

    /// True when both slots share space and date.
    pub fn same_key(&self, other: &Slot) -> bool {
        self.space_id == other.space_id && self.date == other.date
    }
}

pub fn is_supported_date(date: NaiveDate) -> bool {
    (MIN_VALID_YEAR..=MAX_VALID_YEAR).contains(&date.year())
}

/// Trimmed, lower-cased email. Every stored and queried email goes through here.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    /// Owning place; fixed for the lifetime of the space.
    pub place_id: PlaceId,
    pub name: String,
    pub capacity: u32,
    pub reference: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub space_id: SpaceId,
    /// Copied from the space at write time.
    pub place_id: PlaceId,
    pub customer_email: String,
    pub date: NaiveDate,
    pub span: Span,
}

impl Reservation {
    pub fn slot(&self) -> Slot {
        Slot {
            space_id: self.space_id,
            date: self.date,
            span: self.span,
        }
    }
}

/// What a caller asks to book. Times are raw so the validator can reject bad input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationCandidate {
    pub space_id: SpaceId,
    pub customer_email: String,
    pub date: NaiveDate,
    pub start: Ms,
    pub end: Ms,
}

impl ReservationCandidate {
    pub fn new(
        space_id: SpaceId,
        customer_email: &str,
        date: NaiveDate,
        start: Ms,
        end: Ms,
    ) -> Self {
        Self {
            space_id,
            customer_email: normalize_email(customer_email),
            date,
            start,
            end,
        }
    }

    pub fn slot(&self) -> Result<Slot, EngineError> {
        Slot::new(self.space_id, self.date, self.start, self.end)
    }
}

/// Partial update; absent fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub space_id: Option<SpaceId>,
    pub customer_email: Option<String>,
    pub date: Option<NaiveDate>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
}

impl ReservationPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay the patch onto an existing reservation.
    pub fn apply_to(&self, existing: &Reservation) -> ReservationCandidate {
        let email = self
            .customer_email
            .as_deref()
            .unwrap_or(&existing.customer_email);
        ReservationCandidate::new(
            self.space_id.unwrap_or(existing.space_id),
            email,
            self.date.unwrap_or(existing.date),
            self.start.unwrap_or(existing.span.start),
            self.end.unwrap_or(existing.span.end),
        )
    }
}

/// WAL record format. Flat, no nesting.
/// `*Written` events insert or replace by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PlaceWritten(Place),
    PlaceDeleted { id: PlaceId },
    SpaceWritten(Space),
    SpaceDeleted { id: SpaceId },
    ReservationWritten(Reservation),
    ReservationDeleted { id: ReservationId },
}

/// One page of a listing, ordered by date then start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(self.limit)
    }
}
