use ulid::Ulid;

/// Why a room or booking cannot take the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// The room is already booked over the requested interval.
    Conflict { booking: Ulid },
    /// The booking's roster is full.
    AtCapacity { capacity: u32 },
}

#[derive(Debug)]
pub enum EngineError {
    RoomNotFound(Ulid),
    OrganiserNotFound(Ulid),
    AttendeeNotFound(Ulid),
    BookingNotFound(Ulid),
    ResourceUnavailable(Unavailable),
    AlreadyRegistered { attendee: Ulid, booking: Ulid },
    NotRegistered { attendee: Ulid, booking: Ulid },
    NotAuthorized { organiser: Ulid, booking: Ulid },
    AlreadyExists(Ulid),
    UsernameTaken(String),
    RoomHasBookings(Ulid),
    /// Organiser still owns bookings, or attendee still holds registrations.
    UserHasBookings(Ulid),
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::RoomNotFound(_)
            | EngineError::OrganiserNotFound(_)
            | EngineError::AttendeeNotFound(_)
            | EngineError::BookingNotFound(_) => "not_found",
            EngineError::ResourceUnavailable(Unavailable::Conflict { .. }) => "conflict",
            EngineError::ResourceUnavailable(Unavailable::AtCapacity { .. }) => "at_capacity",
            EngineError::AlreadyRegistered { .. } => "already_registered",
            EngineError::NotRegistered { .. } => "not_registered",
            EngineError::NotAuthorized { .. } => "not_authorized",
            EngineError::AlreadyExists(_) | EngineError::UsernameTaken(_) => "already_exists",
            EngineError::RoomHasBookings(_) => "room_has_bookings",
            EngineError::UserHasBookings(_) => "user_has_bookings",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::RoomNotFound(_)
                | EngineError::OrganiserNotFound(_)
                | EngineError::AttendeeNotFound(_)
                | EngineError::BookingNotFound(_)
        )
    }

    pub fn is_resource_unavailable(&self) -> bool {
        matches!(self, EngineError::ResourceUnavailable(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::OrganiserNotFound(id) => write!(f, "organiser not found: {id}"),
            EngineError::AttendeeNotFound(id) => write!(f, "attendee not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::ResourceUnavailable(Unavailable::Conflict { booking }) => {
                write!(f, "room is not available: conflicts with booking {booking}")
            }
            EngineError::ResourceUnavailable(Unavailable::AtCapacity { capacity }) => {
                write!(f, "booking is at full capacity ({capacity})")
            }
            EngineError::AlreadyRegistered { attendee, booking } => {
                write!(f, "attendee {attendee} is already registered for booking {booking}")
            }
            EngineError::NotRegistered { attendee, booking } => {
                write!(f, "attendee {attendee} is not registered for booking {booking}")
            }
            EngineError::NotAuthorized { organiser, booking } => {
                write!(f, "organiser {organiser} is not the organiser of booking {booking}")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::UsernameTaken(name) => write!(f, "username already taken: {name}"),
            EngineError::RoomHasBookings(id) => {
                write!(f, "cannot delete room {id}: it still has bookings")
            }
            EngineError::UserHasBookings(id) => {
                write!(f, "cannot delete user {id}: it still has bookings")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
