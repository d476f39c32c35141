use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::model::*;

use super::error::StoreError;
use super::quota::{count_in_week, WeekWindow};

/// Persistence collaborator behind the admission gateway.
///
/// The gateway serializes every call that touches a given `(space, date)` or
/// `(customer, week)` key, so implementations only need each call to be atomic
/// on its own: a write is either fully visible or not visible at all.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Reservations on `space_id` for `date`, minus `excluding`.
    async fn find_peers(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
        excluding: Option<ReservationId>,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn count_in_week(
        &self,
        customer_email: &str,
        window: WeekWindow,
        excluding: Option<ReservationId>,
    ) -> Result<u32, StoreError>;

    /// Insert, or replace the reservation with the same id.
    async fn write_reservation(&self, reservation: Reservation) -> Result<Reservation, StoreError>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    async fn remove_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError>;

    async fn count_for_space(&self, space_id: SpaceId) -> Result<usize, StoreError>;

    // ── Catalog ──────────────────────────────────────────────

    async fn write_place(&self, place: Place) -> Result<(), StoreError>;

    async fn get_place(&self, id: PlaceId) -> Result<Option<Place>, StoreError>;

    async fn list_places(&self) -> Result<Vec<Place>, StoreError>;

    async fn remove_place(&self, id: PlaceId) -> Result<Option<Place>, StoreError>;

    async fn write_space(&self, space: Space) -> Result<(), StoreError>;

    async fn get_space(&self, id: SpaceId) -> Result<Option<Space>, StoreError>;

    /// All spaces, or only those of `place_id`.
    async fn list_spaces(&self, place_id: Option<PlaceId>) -> Result<Vec<Space>, StoreError>;

    async fn remove_space(&self, id: SpaceId) -> Result<Option<Space>, StoreError>;
}

/// DashMap-backed state with secondary indexes for the admission queries.
/// Volatile on its own; `WalStore` wraps it for durability.
pub struct InMemoryStore {
    places: DashMap<PlaceId, Place>,
    spaces: DashMap<SpaceId, Space>,
    reservations: DashMap<ReservationId, Reservation>,
    /// (space, date) → reservation ids
    by_slot: DashMap<(SpaceId, NaiveDate), Vec<ReservationId>>,
    /// normalized email → reservation ids
    by_customer: DashMap<String, Vec<ReservationId>>,
    /// place → space ids
    place_spaces: DashMap<PlaceId, Vec<SpaceId>>,
    /// space → live reservation count
    space_load: DashMap<SpaceId, usize>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            places: DashMap::new(),
            spaces: DashMap::new(),
            reservations: DashMap::new(),
            by_slot: DashMap::new(),
            by_customer: DashMap::new(),
            place_spaces: DashMap::new(),
            space_load: DashMap::new(),
        }
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::PlaceWritten(place) => {
                self.places.insert(place.id, place.clone());
            }
            Event::PlaceDeleted { id } => {
                self.places.remove(id);
                self.place_spaces.remove(id);
            }
            Event::SpaceWritten(space) => {
                if let Some(old) = self.spaces.insert(space.id, space.clone()) {
                    if old.place_id == space.place_id {
                        return;
                    }
                    self.unlink_space(&old);
                }
                self.place_spaces
                    .entry(space.place_id)
                    .or_default()
                    .push(space.id);
            }
            Event::SpaceDeleted { id } => {
                if let Some((_, old)) = self.spaces.remove(id) {
                    self.unlink_space(&old);
                }
                self.space_load.remove(id);
            }
            Event::ReservationWritten(reservation) => {
                if let Some(old) = self.reservations.insert(reservation.id, reservation.clone()) {
                    self.unindex(&old);
                }
                self.index(reservation);
            }
            Event::ReservationDeleted { id } => {
                if let Some((_, old)) = self.reservations.remove(id) {
                    self.unindex(&old);
                }
            }
        }
    }

    /// Events that recreate the current state, parents before children.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = Vec::new();
        events.extend(self.places.iter().map(|e| Event::PlaceWritten(e.value().clone())));
        events.extend(self.spaces.iter().map(|e| Event::SpaceWritten(e.value().clone())));
        events.extend(
            self.reservations
                .iter()
                .map(|e| Event::ReservationWritten(e.value().clone())),
        );
        events
    }

    fn index(&self, r: &Reservation) {
        self.by_slot
            .entry((r.space_id, r.date))
            .or_default()
            .push(r.id);
        self.by_customer
            .entry(r.customer_email.clone())
            .or_default()
            .push(r.id);
        *self.space_load.entry(r.space_id).or_default() += 1;
    }

    fn unindex(&self, r: &Reservation) {
        let key = (r.space_id, r.date);
        if let Some(mut ids) = self.by_slot.get_mut(&key) {
            ids.retain(|id| id != &r.id);
        }
        self.by_slot.remove_if(&key, |_, ids| ids.is_empty());

        if let Some(mut ids) = self.by_customer.get_mut(&r.customer_email) {
            ids.retain(|id| id != &r.id);
        }
        self.by_customer
            .remove_if(&r.customer_email, |_, ids| ids.is_empty());

        if let Some(mut load) = self.space_load.get_mut(&r.space_id) {
            *load = load.saturating_sub(1);
        }
    }

    fn unlink_space(&self, space: &Space) {
        if let Some(mut kids) = self.place_spaces.get_mut(&space.place_id) {
            kids.retain(|c| c != &space.id);
        }
    }

    fn resolve(&self, ids: &[ReservationId]) -> Vec<Reservation> {
        ids.iter()
            .filter_map(|id| self.reservations.get(id).map(|r| r.value().clone()))
            .collect()
    }

    // ── Synchronous reads shared with WalStore ───────────────

    pub fn peers(&self, space_id: SpaceId, date: NaiveDate, excluding: Option<ReservationId>) -> Vec<Reservation> {
        let ids = self
            .by_slot
            .get(&(space_id, date))
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut peers = self.resolve(&ids);
        peers.retain(|r| Some(r.id) != excluding);
        peers
    }

    pub fn week_count(&self, customer_email: &str, window: &WeekWindow, excluding: Option<ReservationId>) -> u32 {
        let ids = self
            .by_customer
            .get(customer_email)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        count_in_week(&self.resolve(&ids), customer_email, window, excluding)
    }

    pub fn reservation(&self, id: &ReservationId) -> Option<Reservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    pub fn all_reservations(&self) -> Vec<Reservation> {
        self.reservations.iter().map(|e| e.value().clone()).collect()
    }

    pub fn load_of(&self, space_id: &SpaceId) -> usize {
        self.space_load.get(space_id).map(|e| *e.value()).unwrap_or(0)
    }

    pub fn place(&self, id: &PlaceId) -> Option<Place> {
        self.places.get(id).map(|e| e.value().clone())
    }

    pub fn all_places(&self) -> Vec<Place> {
        self.places.iter().map(|e| e.value().clone()).collect()
    }

    pub fn space(&self, id: &SpaceId) -> Option<Space> {
        self.spaces.get(id).map(|e| e.value().clone())
    }

    pub fn spaces_of(&self, place_id: Option<PlaceId>) -> Vec<Space> {
        match place_id {
            Some(pid) => {
                let ids = self
                    .place_spaces
                    .get(&pid)
                    .map(|e| e.value().clone())
                    .unwrap_or_default();
                ids.iter().filter_map(|id| self.space(id)).collect()
            }
            None => self.spaces.iter().map(|e| e.value().clone()).collect(),
        }
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn find_peers(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
        excluding: Option<ReservationId>,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.peers(space_id, date, excluding))
    }

    async fn count_in_week(
        &self,
        customer_email: &str,
        window: WeekWindow,
        excluding: Option<ReservationId>,
    ) -> Result<u32, StoreError> {
        Ok(self.week_count(customer_email, &window, excluding))
    }

    async fn write_reservation(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        self.apply_event(&Event::ReservationWritten(reservation.clone()));
        Ok(reservation)
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservation(&id))
    }

    async fn remove_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let existing = self.reservation(&id);
        if existing.is_some() {
            self.apply_event(&Event::ReservationDeleted { id });
        }
        Ok(existing)
    }

    async fn list_reservations(&self) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.all_reservations())
    }

    async fn count_for_space(&self, space_id: SpaceId) -> Result<usize, StoreError> {
        Ok(self.load_of(&space_id))
    }

    async fn write_place(&self, place: Place) -> Result<(), StoreError> {
        self.apply_event(&Event::PlaceWritten(place));
        Ok(())
    }

    async fn get_place(&self, id: PlaceId) -> Result<Option<Place>, StoreError> {
        Ok(self.place(&id))
    }

    async fn list_places(&self) -> Result<Vec<Place>, StoreError> {
        Ok(self.all_places())
    }

    async fn remove_place(&self, id: PlaceId) -> Result<Option<Place>, StoreError> {
        let existing = self.place(&id);
        if existing.is_some() {
            self.apply_event(&Event::PlaceDeleted { id });
        }
        Ok(existing)
    }

    async fn write_space(&self, space: Space) -> Result<(), StoreError> {
        self.apply_event(&Event::SpaceWritten(space));
        Ok(())
    }

    async fn get_space(&self, id: SpaceId) -> Result<Option<Space>, StoreError> {
        Ok(self.space(&id))
    }

    async fn list_spaces(&self, place_id: Option<PlaceId>) -> Result<Vec<Space>, StoreError> {
        Ok(self.spaces_of(place_id))
    }

    async fn remove_space(&self, id: SpaceId) -> Result<Option<Space>, StoreError> {
        let existing = self.space(&id);
        if existing.is_some() {
            self.apply_event(&Event::SpaceDeleted { id });
        }
        Ok(existing)
    }
}
