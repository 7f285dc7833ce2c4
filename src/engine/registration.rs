use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError, Unavailable};

impl Engine {
    /// Add an attendee to a booking's roster.
    ///
    /// Checks run in order: attendee exists, booking exists, not already
    /// registered, seat free. The booking's write lock is held until the
    /// registration is applied, so the last seat goes to exactly one caller.
    pub async fn register_attendee(
        &self,
        attendee_id: Ulid,
        booking_id: Ulid,
    ) -> Result<BookingInfo, EngineError> {
        self.commit("register_attendee", self.register_locked(attendee_id, booking_id))
            .await
    }

    async fn register_locked(
        &self,
        attendee_id: Ulid,
        booking_id: Ulid,
    ) -> Result<BookingInfo, EngineError> {
        if !self.attendees.contains_key(&attendee_id) {
            return Err(EngineError::AttendeeNotFound(attendee_id));
        }
        let bs = self
            .get_booking_state(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let mut guard = bs.write().await;
        if guard.cancelled {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        if guard.is_registered(&attendee_id) {
            return Err(EngineError::AlreadyRegistered { attendee: attendee_id, booking: booking_id });
        }
        if !guard.has_space() {
            return Err(EngineError::ResourceUnavailable(Unavailable::AtCapacity {
                capacity: guard.capacity,
            }));
        }

        let event = Event::AttendeeRegistered { booking_id, attendee_id };
        self.persist_and_apply(&event, None, Some(&mut *guard)).await?;
        info!(
            "attendee {attendee_id} registered for booking {booking_id} ({}/{})",
            guard.roster.len(),
            guard.capacity
        );
        Ok(guard.info())
    }

    /// Remove an attendee from a booking's roster. The freed seat is
    /// available to the next `register_attendee` as soon as this returns.
    pub async fn deregister_attendee(
        &self,
        attendee_id: Ulid,
        booking_id: Ulid,
    ) -> Result<BookingInfo, EngineError> {
        self.commit("deregister_attendee", self.deregister_locked(attendee_id, booking_id))
            .await
    }

    async fn deregister_locked(
        &self,
        attendee_id: Ulid,
        booking_id: Ulid,
    ) -> Result<BookingInfo, EngineError> {
        if !self.attendees.contains_key(&attendee_id) {
            return Err(EngineError::AttendeeNotFound(attendee_id));
        }
        let bs = self
            .get_booking_state(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let mut guard = bs.write().await;
        if guard.cancelled {
            return Err(EngineError::BookingNotFound(booking_id));
        }
        if !guard.is_registered(&attendee_id) {
            return Err(EngineError::NotRegistered { attendee: attendee_id, booking: booking_id });
        }

        let event = Event::AttendeeDeregistered { booking_id, attendee_id };
        self.persist_and_apply(&event, None, Some(&mut *guard)).await?;
        info!("attendee {attendee_id} deregistered from booking {booking_id}");
        Ok(guard.info())
    }
}
