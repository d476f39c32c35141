use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, LockKey, ReservationStore};

fn check_text(value: &str, max: usize, empty: &'static str, long: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(empty));
    }
    if value.len() > max {
        return Err(EngineError::LimitExceeded(long));
    }
    Ok(())
}

fn check_place(place: &Place) -> Result<(), EngineError> {
    check_text(&place.name, MAX_NAME_LEN, "place name is required", "place name too long")?;
    check_text(
        &place.location,
        MAX_LOCATION_LEN,
        "place location is required",
        "place location too long",
    )
}

fn check_space(space: &Space) -> Result<(), EngineError> {
    check_text(&space.name, MAX_NAME_LEN, "space name is required", "space name too long")?;
    if space.capacity == 0 {
        return Err(EngineError::InvalidInput("space capacity must be positive"));
    }
    if space.reference.as_ref().is_some_and(|r| r.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("space reference too long"));
    }
    if space
        .description
        .as_ref()
        .is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN)
    {
        return Err(EngineError::LimitExceeded("space description too long"));
    }
    Ok(())
}

impl<S: ReservationStore + 'static> Engine<S> {
    pub async fn create_place(&self, place: Place) -> Result<(), EngineError> {
        check_place(&place)?;
        let _catalog = self.catalog.lock().await;
        if self.store.get_place(place.id).await?.is_some() {
            return Err(EngineError::AlreadyExists(place.id));
        }
        if self.store.list_places().await?.len() >= MAX_PLACES {
            return Err(EngineError::LimitExceeded("too many places"));
        }
        let id = place.id;
        self.store.write_place(place).await?;
        info!(place_id = %id, "place created");
        Ok(())
    }

    pub async fn update_place(&self, place: Place) -> Result<(), EngineError> {
        check_place(&place)?;
        let _catalog = self.catalog.lock().await;
        if self.store.get_place(place.id).await?.is_none() {
            return Err(EngineError::NotFound(place.id));
        }
        self.store.write_place(place).await?;
        Ok(())
    }

    /// Fails with `HasChildren` while the place still owns spaces.
    pub async fn delete_place(&self, id: PlaceId) -> Result<Place, EngineError> {
        let _catalog = self.catalog.lock().await;
        if self.store.get_place(id).await?.is_none() {
            return Err(EngineError::NotFound(id));
        }
        if !self.store.list_spaces(Some(id)).await?.is_empty() {
            return Err(EngineError::HasChildren(id));
        }
        let removed = self
            .store
            .remove_place(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        info!(place_id = %id, "place deleted");
        Ok(removed)
    }

    pub async fn create_space(&self, space: Space) -> Result<(), EngineError> {
        check_space(&space)?;
        let _catalog = self.catalog.lock().await;
        if self.store.get_space(space.id).await?.is_some() {
            return Err(EngineError::AlreadyExists(space.id));
        }
        if self.store.get_place(space.place_id).await?.is_none() {
            return Err(EngineError::NotFound(space.place_id));
        }
        if self.store.list_spaces(Some(space.place_id)).await?.len() >= MAX_SPACES_PER_PLACE {
            return Err(EngineError::LimitExceeded("too many spaces in place"));
        }
        let (id, place_id) = (space.id, space.place_id);
        self.store.write_space(space).await?;
        info!(space_id = %id, place_id = %place_id, "space created");
        Ok(())
    }

    /// Rewrites name, capacity, reference and description. The owning place
    /// never changes, so `space.place_id` is ignored.
    pub async fn update_space(&self, space: Space) -> Result<Space, EngineError> {
        check_space(&space)?;
        let _catalog = self.catalog.lock().await;
        let existing = self
            .store
            .get_space(space.id)
            .await?
            .ok_or(EngineError::NotFound(space.id))?;
        let updated = Space {
            place_id: existing.place_id,
            ..space
        };
        self.store.write_space(updated.clone()).await?;
        Ok(updated)
    }

    /// Fails with `HasReservations` while any reservation points at the space.
    /// Waits for in-flight admissions on the space, up to the lock timeout.
    pub async fn delete_space(&self, id: SpaceId) -> Result<Space, EngineError> {
        let _catalog = self.catalog.lock().await;
        let _space = self.lock_keys([LockKey::Space(id)], self.deadline()).await?;
        if self.store.get_space(id).await?.is_none() {
            return Err(EngineError::NotFound(id));
        }
        if self.store.count_for_space(id).await? > 0 {
            return Err(EngineError::HasReservations(id));
        }
        let removed = self
            .store
            .remove_space(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        info!(space_id = %id, "space deleted");
        Ok(removed)
    }
}
