use crate::limits::*;
use crate::model::*;

use super::{EngineError, Unavailable};

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// First existing slot that is not disjoint from `candidate`.
///
/// Intervals are half-open, so a booking ending at T and another starting
/// at T coexist.
pub fn find_conflict<'a>(
    existing: impl IntoIterator<Item = &'a Slot>,
    candidate: &Span,
) -> Option<&'a Slot> {
    existing
        .into_iter()
        .find(|slot| slot.span.overlaps(candidate))
}

/// Conflict check against a locked room. Only reads the room's slots, never
/// its manual `available` flag.
pub(crate) fn check_no_conflict(rs: &RoomState, candidate: &Span) -> Result<(), EngineError> {
    match find_conflict(rs.overlapping(candidate), candidate) {
        Some(slot) => Err(EngineError::ResourceUnavailable(Unavailable::Conflict {
            booking: slot.booking_id,
        })),
        None => Ok(()),
    }
}

pub(crate) fn validate_name(name: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidInput(what));
    }
    if name.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

/// Bounds on a requested booking interval. Past starts are rejected here,
/// not in the checker.
pub(crate) fn validate_booking_window(
    start: Ms,
    duration_minutes: u32,
    now: Ms,
) -> Result<Span, EngineError> {
    if duration_minutes == 0 {
        return Err(EngineError::InvalidInput("duration must be at least one minute"));
    }
    if duration_minutes > MAX_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("duration too long"));
    }
    if start < now {
        return Err(EngineError::InvalidInput("start time is in the past"));
    }
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&start) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::from_minutes(start, duration_minutes);
    if span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(span)
}
