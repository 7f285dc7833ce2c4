use crate::model::Ms;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_EVENT_NAME_LEN: usize = 512;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;

/// One week.
pub const MAX_DURATION_MINUTES: u32 = 7 * 24 * 60;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const MS_PER_MINUTE: Ms = 60_000;
