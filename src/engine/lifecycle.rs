use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_booking_window, validate_name};
use super::{Engine, EngineError};

impl Engine {
    /// Reserve `room_id` for `[start, start + duration_minutes)`.
    ///
    /// The room's write lock is held from the conflict check until the
    /// booking is applied, so two overlapping requests for the same room
    /// cannot both succeed.
    pub async fn create_booking(
        &self,
        id: Ulid,
        event_name: String,
        room_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        organiser_id: Ulid,
    ) -> Result<BookingInfo, EngineError> {
        self.commit(
            "create_booking",
            self.create_booking_locked(id, event_name, room_id, start, duration_minutes, organiser_id),
        )
        .await
    }

    async fn create_booking_locked(
        &self,
        id: Ulid,
        event_name: String,
        room_id: Ulid,
        start: Ms,
        duration_minutes: u32,
        organiser_id: Ulid,
    ) -> Result<BookingInfo, EngineError> {
        validate_name(&event_name, MAX_EVENT_NAME_LEN, "event name")?;
        let span = validate_booking_window(start, duration_minutes, now_ms())?;

        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;
        if guard.deleted {
            return Err(EngineError::RoomNotFound(room_id));
        }
        if !self.organisers.contains_key(&organiser_id) {
            return Err(EngineError::OrganiserNotFound(organiser_id));
        }
        if self.bookings.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.slots.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings in room"));
        }

        check_no_conflict(&guard, &span)?;

        let event = Event::BookingCreated {
            id,
            room_id,
            organiser_id,
            event_name: event_name.clone(),
            start,
            duration_minutes,
        };
        self.persist_and_apply(&event, Some(&mut *guard), None).await?;
        info!("booking {id} created in room {room_id} [{}, {})", span.start, span.end);

        Ok(BookingInfo {
            booking: Booking {
                id,
                event_name,
                room_id,
                organiser_id,
                start,
                duration_minutes,
            },
            capacity: guard.room.capacity,
            attendees: Vec::new(),
        })
    }

    /// Cancel a booking on behalf of the organiser who created it. Every
    /// registered attendee loses the booking from their registered set.
    pub async fn cancel_booking(&self, id: Ulid, organiser_id: Ulid) -> Result<(), EngineError> {
        self.commit("cancel_booking", self.cancel_booking_locked(id, organiser_id))
            .await
    }

    async fn cancel_booking_locked(&self, id: Ulid, organiser_id: Ulid) -> Result<(), EngineError> {
        let bs = self
            .get_booking_state(&id)
            .ok_or(EngineError::BookingNotFound(id))?;
        let room_id = bs.read().await.booking.room_id;
        // A room with bookings cannot be deleted.
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::BookingNotFound(id))?;

        // Room before booking: the only place both are taken.
        let mut room_guard = rs.write().await;
        let mut booking_guard = bs.write().await;
        if booking_guard.cancelled {
            return Err(EngineError::BookingNotFound(id));
        }
        if booking_guard.booking.organiser_id != organiser_id {
            return Err(EngineError::NotAuthorized { organiser: organiser_id, booking: id });
        }

        let released = booking_guard.roster.len();
        let event = Event::BookingCancelled { id, room_id };
        self.persist_and_apply(&event, Some(&mut *room_guard), Some(&mut *booking_guard))
            .await?;
        info!("booking {id} cancelled, {released} registrations released");
        Ok(())
    }
}
