use dashmap::mapref::entry::Entry;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::validate_name;
use super::{Engine, EngineError};

impl Engine {
    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(&self, id: Ulid, name: String, capacity: u32) -> Result<Room, EngineError> {
        self.commit("create_room", async {
            validate_name(&name, MAX_NAME_LEN, "room name")?;
            if capacity == 0 {
                return Err(EngineError::InvalidInput("room capacity must be at least 1"));
            }
            if self.rooms.len() >= MAX_ROOMS {
                return Err(EngineError::LimitExceeded("too many rooms"));
            }
            if self.rooms.contains_key(&id) {
                return Err(EngineError::AlreadyExists(id));
            }

            let event = Event::RoomCreated { id, name: name.clone(), capacity };
            self.persist_and_apply(&event, None, None).await?;
            info!("room {id} created: {name:?}, capacity {capacity}");
            Ok(Room { id, name, capacity, available: true })
        })
        .await
    }

    /// Set the manual lockout flag. Booking and registration ignore it.
    pub async fn set_room_availability(&self, id: Ulid, available: bool) -> Result<Room, EngineError> {
        self.commit("set_room_availability", async {
            let rs = self.get_room_state(&id).ok_or(EngineError::RoomNotFound(id))?;
            let mut guard = rs.write().await;
            if guard.deleted {
                return Err(EngineError::RoomNotFound(id));
            }
            if guard.room.available != available {
                let event = Event::RoomAvailabilitySet { id, available };
                self.persist_and_apply(&event, Some(&mut *guard), None).await?;
                info!("room {id} marked {}", if available { "available" } else { "unavailable" });
            }
            Ok(guard.room.clone())
        })
        .await
    }

    /// Delete a room that has no bookings left.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        self.commit("delete_room", async {
            let rs = self.get_room_state(&id).ok_or(EngineError::RoomNotFound(id))?;
            let mut guard = rs.write().await;
            if guard.deleted {
                return Err(EngineError::RoomNotFound(id));
            }
            if !guard.slots.is_empty() {
                return Err(EngineError::RoomHasBookings(id));
            }
            let event = Event::RoomDeleted { id };
            self.persist_and_apply(&event, Some(&mut *guard), None).await?;
            info!("room {id} deleted");
            Ok(())
        })
        .await
    }

    pub async fn get_room(&self, id: &Ulid) -> Result<Room, EngineError> {
        let rs = self.get_room_state(id).ok_or(EngineError::RoomNotFound(*id))?;
        let guard = rs.read().await;
        Ok(guard.room.clone())
    }

    pub async fn list_rooms(&self) -> Vec<Room> {
        let states: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::with_capacity(states.len());
        for rs in states {
            rooms.push(rs.read().await.room.clone());
        }
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    /// Rooms whose manual flag is set.
    pub async fn list_available_rooms(&self) -> Vec<Room> {
        let mut rooms = self.list_rooms().await;
        rooms.retain(|r| r.available);
        rooms
    }

    // ── Users ────────────────────────────────────────────────

    pub async fn create_organiser(
        &self,
        id: Ulid,
        name: String,
        username: String,
    ) -> Result<Organiser, EngineError> {
        self.commit("create_organiser", async {
            self.register_user(id, &name, &username, || Event::OrganiserCreated {
                id,
                name: name.clone(),
                username: username.clone(),
            })
            .await?;
            info!("organiser {id} created: {username}");
            Ok::<_, EngineError>(Organiser { id, name, username })
        })
        .await
    }

    pub async fn create_attendee(
        &self,
        id: Ulid,
        name: String,
        username: String,
    ) -> Result<Attendee, EngineError> {
        self.commit("create_attendee", async {
            self.register_user(id, &name, &username, || Event::AttendeeCreated {
                id,
                name: name.clone(),
                username: username.clone(),
            })
            .await?;
            info!("attendee {id} created: {username}");
            Ok::<_, EngineError>(Attendee { id, name, username })
        })
        .await
    }

    /// Claim the username, then persist. The claim is released if the WAL
    /// append fails.
    async fn register_user(
        &self,
        id: Ulid,
        name: &str,
        username: &str,
        event: impl FnOnce() -> Event,
    ) -> Result<(), EngineError> {
        validate_name(name, MAX_NAME_LEN, "name")?;
        validate_name(username, MAX_NAME_LEN, "username")?;
        if self.organisers.contains_key(&id) || self.attendees.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(_) => return Err(EngineError::UsernameTaken(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let event = event();
        if let Err(e) = self.persist_and_apply(&event, None, None).await {
            self.usernames.remove_if(username, |_, owner| *owner == id);
            return Err(e);
        }
        Ok(())
    }

    /// Remove an organiser who owns no live bookings. Frees the username.
    ///
    /// Runs with the commit gate held exclusively so no booking can be
    /// created for this organiser between the check and the delete.
    pub async fn delete_organiser(&self, id: Ulid) -> Result<(), EngineError> {
        self.commit_exclusive("delete_organiser", async {
            if !self.organisers.contains_key(&id) {
                return Err(EngineError::OrganiserNotFound(id));
            }
            let states: Vec<_> = self.bookings.iter().map(|e| e.value().clone()).collect();
            for bs in states {
                let guard = bs.read().await;
                if !guard.cancelled && guard.booking.organiser_id == id {
                    return Err(EngineError::UserHasBookings(id));
                }
            }
            self.persist_and_apply(&Event::OrganiserDeleted { id }, None, None)
                .await?;
            info!("organiser {id} deleted");
            Ok(())
        })
        .await
    }

    /// Remove an attendee with no registrations. Frees the username.
    pub async fn delete_attendee(&self, id: Ulid) -> Result<(), EngineError> {
        self.commit_exclusive("delete_attendee", async {
            if !self.attendees.contains_key(&id) {
                return Err(EngineError::AttendeeNotFound(id));
            }
            let registered = self
                .attendee_bookings
                .get(&id)
                .is_some_and(|set| !set.is_empty());
            if registered {
                return Err(EngineError::UserHasBookings(id));
            }
            self.persist_and_apply(&Event::AttendeeDeleted { id }, None, None)
                .await?;
            info!("attendee {id} deleted");
            Ok(())
        })
        .await
    }

    pub fn get_organiser(&self, id: &Ulid) -> Result<Organiser, EngineError> {
        self.organisers
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::OrganiserNotFound(*id))
    }

    pub fn get_attendee(&self, id: &Ulid) -> Result<Attendee, EngineError> {
        self.attendees
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::AttendeeNotFound(*id))
    }

    pub fn find_user_by_username(&self, username: &str) -> Option<User> {
        let id = *self.usernames.get(username)?.value();
        if let Some(o) = self.organisers.get(&id) {
            return Some(User::Organiser(o.value().clone()));
        }
        self.attendees
            .get(&id)
            .map(|a| User::Attendee(a.value().clone()))
    }

    pub fn list_organisers(&self) -> Vec<Organiser> {
        let mut all: Vec<Organiser> = self.organisers.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|o| o.id);
        all
    }

    pub fn list_attendees(&self) -> Vec<Attendee> {
        let mut all: Vec<Attendee> = self.attendees.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|a| a.id);
        all
    }
}
