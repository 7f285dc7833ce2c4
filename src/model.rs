use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::MS_PER_MINUTE;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

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

    /// Span starting at `start` lasting `minutes`.
    pub fn from_minutes(start: Ms, minutes: u32) -> Self {
        Self::new(start, start.saturating_add(Ms::from(minutes) * MS_PER_MINUTE))
    }

    /// Like `from_minutes`, but `None` for a zero duration or an end past
    /// `Ms::MAX`. Safe for any caller-supplied start.
    pub fn checked_from_minutes(start: Ms, minutes: u32) -> Option<Self> {
        if minutes == 0 {
            return None;
        }
        let end = start.checked_add(Ms::from(minutes) * MS_PER_MINUTE)?;
        Some(Self::new(start, end))
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// `[a,b)` and `[c,d)` are disjoint iff `b <= c || a >= d`.
    pub fn overlaps(&self, other: &Span) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    /// Manual lockout switch. Informational only: conflict and capacity
    /// checks never read it.
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organiser {
    pub id: Ulid,
    pub name: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub id: Ulid,
    pub name: String,
    pub username: String,
}

/// A reservation of a room. Room and organiser are fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub event_name: String,
    pub room_id: Ulid,
    pub organiser_id: Ulid,
    pub start: Ms,
    pub duration_minutes: u32,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::from_minutes(self.start, self.duration_minutes)
    }

    pub fn end(&self) -> Ms {
        self.span().end
    }

    /// Bookings in different rooms never overlap.
    pub fn overlaps(&self, other: &Booking) -> bool {
        self.room_id == other.room_id && self.span().overlaps(&other.span())
    }
}

/// A booking's footprint on its room's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub booking_id: Ulid,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Slots of every live booking in this room, sorted by `span.start`.
    pub slots: Vec<Slot>,
    /// Set once the room is deleted; waiters holding a stale Arc see it.
    pub deleted: bool,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            slots: Vec::new(),
            deleted: false,
        }
    }

    /// Insert slot maintaining sort order by span.start.
    pub fn insert_slot(&mut self, slot: Slot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    pub fn remove_slot(&mut self, booking_id: Ulid) -> Option<Slot> {
        let pos = self.slots.iter().position(|s| s.booking_id == booking_id)?;
        Some(self.slots.remove(pos))
    }

    /// Slots whose span overlaps `query`. Binary search skips everything
    /// starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Slot> {
        let right_bound = self.slots.partition_point(|s| s.span.start < query.end);
        self.slots[..right_bound]
            .iter()
            .filter(move |s| s.span.end > query.start)
    }
}

#[derive(Debug, Clone)]
pub struct BookingState {
    pub booking: Booking,
    /// Copied from the room at creation; room capacity is immutable.
    pub capacity: u32,
    /// Registered attendees in registration order. This is the registration
    /// relation; per-attendee views are derived from it.
    pub roster: Vec<Ulid>,
    pub cancelled: bool,
}

impl BookingState {
    pub fn new(booking: Booking, capacity: u32) -> Self {
        Self {
            booking,
            capacity,
            roster: Vec::new(),
            cancelled: false,
        }
    }

    pub fn is_registered(&self, attendee_id: &Ulid) -> bool {
        self.roster.contains(attendee_id)
    }

    pub fn has_space(&self) -> bool {
        self.roster.len() < self.capacity as usize
    }

    pub fn info(&self) -> BookingInfo {
        BookingInfo {
            booking: self.booking.clone(),
            capacity: self.capacity,
            attendees: self.roster.clone(),
        }
    }
}

/// WAL record format. Flat: one event per committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    RoomAvailabilitySet {
        id: Ulid,
        available: bool,
    },
    RoomDeleted {
        id: Ulid,
    },
    OrganiserCreated {
        id: Ulid,
        name: String,
        username: String,
    },
    AttendeeCreated {
        id: Ulid,
        name: String,
        username: String,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        organiser_id: Ulid,
        event_name: String,
        start: Ms,
        duration_minutes: u32,
    },
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
    AttendeeRegistered {
        booking_id: Ulid,
        attendee_id: Ulid,
    },
    AttendeeDeregistered {
        booking_id: Ulid,
        attendee_id: Ulid,
    },
    OrganiserDeleted {
        id: Ulid,
    },
    AttendeeDeleted {
        id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub booking: Booking,
    pub capacity: u32,
    pub attendees: Vec<Ulid>,
}

impl BookingInfo {
    pub fn attendee_count(&self) -> usize {
        self.attendees.len()
    }
}

/// Every booking falls into exactly one of these buckets for a given attendee.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendeeBookings {
    /// Not registered, seats left.
    pub available: Vec<BookingInfo>,
    /// Not registered, full.
    pub unavailable: Vec<BookingInfo>,
    pub registered: Vec<BookingInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum User {
    Organiser(Organiser),
    Attendee(Attendee),
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    fn booking(room_id: Ulid, start: Ms, minutes: u32) -> Booking {
        Booking {
            id: Ulid::new(),
            event_name: "standup".into(),
            room_id,
            organiser_id: Ulid::new(),
            start,
            duration_minutes: minutes,
        }
    }

    #[test]
    fn span_from_minutes() {
        let s = Span::from_minutes(10 * H, 90);
        assert_eq!(s.end, 11 * H + 30 * 60_000);
        assert_eq!(s.duration_ms(), 90 * 60_000);
    }

    #[test]
    fn checked_span_rejects_overflow_and_empty() {
        assert!(Span::checked_from_minutes(Ms::MAX, 60).is_none());
        assert!(Span::checked_from_minutes(Ms::MAX - 1, 1).is_none());
        assert!(Span::checked_from_minutes(10 * H, 0).is_none());
        assert_eq!(
            Span::checked_from_minutes(Ms::MIN, 1),
            Some(Span::new(Ms::MIN, Ms::MIN + 60_000))
        );
        assert_eq!(Span::checked_from_minutes(10 * H, 60), Some(Span::from_minutes(10 * H, 60)));
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::new(100, 200);
        assert!(a.overlaps(&Span::new(150, 250)));
        assert!(!a.overlaps(&Span::new(200, 300))); // adjacent
        assert!(!a.overlaps(&Span::new(0, 100))); // adjacent before
        assert!(a.overlaps(&Span::new(199, 300))); // one ms
        assert!(a.overlaps(&Span::new(0, 1000))); // enclosing
    }

    #[test]
    fn booking_overlap_symmetric() {
        let room = Ulid::new();
        let cases = [
            (booking(room, 10 * H, 60), booking(room, 10 * H + 30 * 60_000, 60)),
            (booking(room, 10 * H, 60), booking(room, 11 * H, 60)),
            (booking(room, 10 * H, 120), booking(room, 10 * H + 30 * 60_000, 15)),
            (booking(room, 9 * H, 1), booking(room, 9 * H, 1)),
        ];
        for (a, b) in &cases {
            assert_eq!(a.overlaps(b), b.overlaps(a));
        }
    }

    #[test]
    fn booking_overlap_requires_same_room() {
        let a = booking(Ulid::new(), 10 * H, 60);
        let b = booking(Ulid::new(), 10 * H, 60);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn booking_end_time() {
        let b = booking(Ulid::new(), 10 * H, 60);
        assert_eq!(b.end(), 11 * H);
    }

    #[test]
    fn slots_sorted_on_insert() {
        let mut rs = RoomState::new(Room {
            id: Ulid::new(),
            name: "A".into(),
            capacity: 2,
            available: true,
        });
        for start in [300, 100, 200] {
            rs.insert_slot(Slot {
                booking_id: Ulid::new(),
                span: Span::new(start, start + 50),
            });
        }
        let starts: Vec<Ms> = rs.slots.iter().map(|s| s.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlapping_skips_adjacent_and_future() {
        let mut rs = RoomState::new(Room {
            id: Ulid::new(),
            name: "A".into(),
            capacity: 2,
            available: true,
        });
        let hit = Ulid::new();
        rs.insert_slot(Slot { booking_id: Ulid::new(), span: Span::new(100, 200) });
        rs.insert_slot(Slot { booking_id: hit, span: Span::new(250, 350) });
        rs.insert_slot(Slot { booking_id: Ulid::new(), span: Span::new(400, 500) });

        let hits: Vec<_> = rs.overlapping(&Span::new(200, 400)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].booking_id, hit);
    }

    #[test]
    fn remove_missing_slot_returns_none() {
        let mut rs = RoomState::new(Room {
            id: Ulid::new(),
            name: "A".into(),
            capacity: 1,
            available: true,
        });
        rs.insert_slot(Slot { booking_id: Ulid::new(), span: Span::new(100, 200) });
        assert!(rs.remove_slot(Ulid::new()).is_none());
        assert_eq!(rs.slots.len(), 1);
    }

    #[test]
    fn booking_state_space() {
        let mut bs = BookingState::new(booking(Ulid::new(), 0, 30), 1);
        assert!(bs.has_space());
        let a = Ulid::new();
        bs.roster.push(a);
        assert!(!bs.has_space());
        assert!(bs.is_registered(&a));
        assert_eq!(bs.info().attendee_count(), 1);
    }
}
