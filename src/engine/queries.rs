use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::quota::WeekWindow;
use super::{Engine, EngineError, ReservationStore};

/// How much of a customer's weekly quota is used around a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekUsage {
    pub window: WeekWindow,
    pub count: u32,
    pub limit: u32,
}

impl WeekUsage {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }
}

fn by_schedule(a: &Reservation, b: &Reservation) -> std::cmp::Ordering {
    (a.date, a.span.start, a.id).cmp(&(b.date, b.span.start, b.id))
}

impl<S: ReservationStore + 'static> Engine<S> {
    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// 1-based pages ordered by date, then start time. `page` 0 is treated as 1;
    /// `limit` is clamped to `1..=MAX_PAGE_LIMIT`.
    pub async fn list_reservations(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<Page<Reservation>, EngineError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let mut all = self.store.list_reservations().await?;
        all.sort_by(by_schedule);
        let total = all.len();
        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    /// Bookings on one space for one date, by start time.
    pub async fn schedule(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
    ) -> Result<Vec<Reservation>, EngineError> {
        let mut peers = self.store.find_peers(space_id, date, None).await?;
        peers.sort_by(by_schedule);
        Ok(peers)
    }

    pub async fn week_usage(
        &self,
        customer_email: &str,
        date: NaiveDate,
    ) -> Result<WeekUsage, EngineError> {
        let window = WeekWindow::containing(date);
        let email = normalize_email(customer_email);
        let count = self.store.count_in_week(&email, window, None).await?;
        Ok(WeekUsage {
            window,
            count,
            limit: self.config.max_reservations_per_week(),
        })
    }

    pub async fn get_place(&self, id: PlaceId) -> Result<Place, EngineError> {
        self.store.get_place(id).await?.ok_or(EngineError::NotFound(id))
    }

    pub async fn list_places(&self) -> Result<Vec<Place>, EngineError> {
        let mut places = self.store.list_places().await?;
        places.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(places)
    }

    pub async fn get_space(&self, id: SpaceId) -> Result<Space, EngineError> {
        self.store.get_space(id).await?.ok_or(EngineError::NotFound(id))
    }

    /// Spaces of one place, or every space when `place_id` is `None`.
    pub async fn list_spaces(&self, place_id: Option<PlaceId>) -> Result<Vec<Space>, EngineError> {
        if let Some(pid) = place_id
            && self.store.get_place(pid).await?.is_none()
        {
            return Err(EngineError::NotFound(pid));
        }
        let mut spaces = self.store.list_spaces(place_id).await?;
        spaces.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(spaces)
    }
}
