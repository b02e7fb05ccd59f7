use ulid::Ulid;

use crate::model::BookingStatus;

/// Coarse failure class, so callers can tell bad input from missing rows,
/// conflicting state and an unavailable backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Persistence,
    Limit,
}

#[derive(Debug)]
pub enum EngineError {
    InvalidDateRange,
    PastDateBooking,
    InvalidField(&'static str, &'static str),
    RoomNotFound(Ulid),
    GuestNotFound(Ulid),
    BookingNotFound(Ulid),
    PaymentNotFound(Ulid),
    RoomUnavailable {
        room_id: Ulid,
        conflicting: Ulid,
    },
    InvalidStateTransition {
        booking_id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    },
    AlreadyExists(Ulid),
    DuplicateRoomNumber(String),
    DuplicateUsername(String),
    RoomInUse(Ulid),
    GuestInUse(Ulid),
    PaymentExists(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidDateRange
            | EngineError::PastDateBooking
            | EngineError::InvalidField(..) => ErrorKind::Validation,
            EngineError::RoomNotFound(_)
            | EngineError::GuestNotFound(_)
            | EngineError::BookingNotFound(_)
            | EngineError::PaymentNotFound(_) => ErrorKind::NotFound,
            EngineError::RoomUnavailable { .. }
            | EngineError::InvalidStateTransition { .. }
            | EngineError::AlreadyExists(_)
            | EngineError::DuplicateRoomNumber(_)
            | EngineError::DuplicateUsername(_)
            | EngineError::RoomInUse(_)
            | EngineError::GuestInUse(_)
            | EngineError::PaymentExists(_) => ErrorKind::Conflict,
            EngineError::LimitExceeded(_) => ErrorKind::Limit,
            EngineError::WalError(_) => ErrorKind::Persistence,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidDateRange => {
                write!(f, "invalid date range: check-out must be after check-in")
            }
            EngineError::PastDateBooking => write!(f, "check-in date is in the past"),
            EngineError::InvalidField(field, reason) => write!(f, "invalid {field}: {reason}"),
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::GuestNotFound(id) => write!(f, "guest not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::PaymentNotFound(id) => write!(f, "no payment for booking: {id}"),
            EngineError::RoomUnavailable {
                room_id,
                conflicting,
            } => write!(
                f,
                "room {room_id} unavailable for the selected dates (conflicts with booking {conflicting})"
            ),
            EngineError::InvalidStateTransition {
                booking_id,
                from,
                to,
            } => write!(f, "booking {booking_id} cannot move from {from} to {to}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::DuplicateRoomNumber(n) => write!(f, "room number already in use: {n}"),
            EngineError::DuplicateUsername(u) => write!(f, "username already taken: {u}"),
            EngineError::RoomInUse(id) => {
                write!(f, "cannot delete room {id}: it has bookings")
            }
            EngineError::GuestInUse(id) => {
                write!(f, "cannot delete guest {id}: referenced by bookings")
            }
            EngineError::PaymentExists(id) => {
                write!(f, "booking {id} already has a payment")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
