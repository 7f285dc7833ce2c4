use ulid::Ulid;

use crate::model::*;

use super::conflict::find_conflict;
use super::{Engine, EngineError, SharedBookingState};

impl Engine {
    /// Would `[start, start + duration_minutes)` clash with a booking already
    /// held for `room_id`? An unknown room has no bookings, so no clash.
    pub async fn has_conflict(&self, room_id: Ulid, start: Ms, duration_minutes: u32) -> bool {
        // Empty or overflowing candidates cover no time a booking can hold.
        let Some(candidate) = Span::checked_from_minutes(start, duration_minutes) else {
            return false;
        };
        let Some(rs) = self.get_room_state(&room_id) else {
            return false;
        };
        let guard = rs.read().await;
        find_conflict(guard.overlapping(&candidate), &candidate).is_some()
    }

    pub async fn get_booking(&self, id: &Ulid) -> Result<BookingInfo, EngineError> {
        let bs = self
            .get_booking_state(id)
            .ok_or(EngineError::BookingNotFound(*id))?;
        let guard = bs.read().await;
        if guard.cancelled {
            return Err(EngineError::BookingNotFound(*id));
        }
        Ok(guard.info())
    }

    pub async fn list_bookings(&self) -> Vec<BookingInfo> {
        let states: Vec<_> = self.bookings.iter().map(|e| e.value().clone()).collect();
        collect_infos(states).await
    }

    /// Bookings held for a room, ordered by start time.
    pub async fn bookings_for_room(&self, room_id: &Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        let rs = self
            .get_room_state(room_id)
            .ok_or(EngineError::RoomNotFound(*room_id))?;
        let ids: Vec<Ulid> = rs.read().await.slots.iter().map(|s| s.booking_id).collect();
        Ok(self.infos_for(&ids).await)
    }

    pub async fn bookings_for_organiser(
        &self,
        organiser_id: &Ulid,
    ) -> Result<Vec<BookingInfo>, EngineError> {
        if !self.organisers.contains_key(organiser_id) {
            return Err(EngineError::OrganiserNotFound(*organiser_id));
        }
        let mut infos = self.list_bookings().await;
        infos.retain(|b| b.booking.organiser_id == *organiser_id);
        Ok(infos)
    }

    /// Bookings the attendee currently holds a seat in.
    pub async fn registered_bookings(&self, attendee_id: &Ulid) -> Result<Vec<BookingInfo>, EngineError> {
        if !self.attendees.contains_key(attendee_id) {
            return Err(EngineError::AttendeeNotFound(*attendee_id));
        }
        let ids: Vec<Ulid> = self
            .attendee_bookings
            .get(attendee_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        Ok(self.infos_for(&ids).await)
    }

    /// Roster of a booking, visible only to the organiser who owns it.
    pub async fn booking_attendees(
        &self,
        booking_id: &Ulid,
        organiser_id: &Ulid,
    ) -> Result<Vec<Attendee>, EngineError> {
        let info = self.get_booking(booking_id).await?;
        if info.booking.organiser_id != *organiser_id {
            return Err(EngineError::NotAuthorized {
                organiser: *organiser_id,
                booking: *booking_id,
            });
        }
        Ok(info
            .attendees
            .iter()
            .filter_map(|id| self.attendees.get(id).map(|a| a.value().clone()))
            .collect())
    }

    /// Split every booking into available / unavailable / registered from
    /// the attendee's point of view. Each booking lands in exactly one bucket.
    pub async fn bookings_for_attendee(&self, attendee_id: &Ulid) -> Result<AttendeeBookings, EngineError> {
        if !self.attendees.contains_key(attendee_id) {
            return Err(EngineError::AttendeeNotFound(*attendee_id));
        }
        let mut out = AttendeeBookings::default();
        for info in self.list_bookings().await {
            if info.attendees.contains(attendee_id) {
                out.registered.push(info);
            } else if info.attendee_count() < info.capacity as usize {
                out.available.push(info);
            } else {
                out.unavailable.push(info);
            }
        }
        Ok(out)
    }

    async fn infos_for(&self, ids: &[Ulid]) -> Vec<BookingInfo> {
        let states: Vec<_> = ids.iter().filter_map(|id| self.get_booking_state(id)).collect();
        collect_infos(states).await
    }
}

/// Snapshot each live booking, ordered by start time.
async fn collect_infos(states: Vec<SharedBookingState>) -> Vec<BookingInfo> {
    let mut infos = Vec::with_capacity(states.len());
    for bs in states {
        let guard = bs.read().await;
        if !guard.cancelled {
            infos.push(guard.info());
        }
    }
    sort_by_start(&mut infos);
    infos
}

fn sort_by_start(infos: &mut [BookingInfo]) {
    infos.sort_by_key(|b| (b.booking.start, b.booking.id));
}
