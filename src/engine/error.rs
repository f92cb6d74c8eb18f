use chrono::NaiveDate;

use crate::model::{GuestId, ReservationId, ReservationStatus, RoomId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Room(RoomId),
    Reservation(ReservationId),
    Guest(GuestId),
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Room(id) => write!(f, "room {id}"),
            Entity::Reservation(id) => write!(f, "reservation {id}"),
            Entity::Guest(id) => write!(f, "guest {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    DuplicateRoom(RoomId),
    NotFound(Entity),
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
        reason: &'static str,
    },
    RoomUnavailable {
        room_id: RoomId,
        conflicting: ReservationId,
    },
    InvalidTransition {
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    /// A store or payment call exceeded the persist timeout.
    Timeout(&'static str),
    /// The store kept rejecting the save after the one automatic retry.
    PersistenceConflict(ReservationId),
    RoomInactive(RoomId),
    RoomInUse {
        room_id: RoomId,
        reservation: ReservationId,
    },
    CapacityExceeded {
        room_id: RoomId,
        capacity: u32,
        party_size: u32,
    },
    PaymentDeclined(ReservationId),
    LimitExceeded(&'static str),
    Storage(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::DuplicateRoom(id) => write!(f, "room already exists: {id}"),
            EngineError::NotFound(entity) => write!(f, "not found: {entity}"),
            EngineError::InvalidRange {
                check_in,
                check_out,
                reason,
            } => write!(f, "invalid stay [{check_in}, {check_out}): {reason}"),
            EngineError::RoomUnavailable {
                room_id,
                conflicting,
            } => write!(f, "room {room_id} unavailable: overlaps reservation {conflicting}"),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} cannot go from {from} to {to}")
            }
            EngineError::Timeout(op) => write!(f, "timed out: {op}"),
            EngineError::PersistenceConflict(id) => {
                write!(f, "persistence conflict saving reservation {id}")
            }
            EngineError::RoomInactive(id) => write!(f, "room {id} is out of service"),
            EngineError::RoomInUse {
                room_id,
                reservation,
            } => write!(f, "room {room_id} has active reservation {reservation}"),
            EngineError::CapacityExceeded {
                room_id,
                capacity,
                party_size,
            } => write!(
                f,
                "party of {party_size} exceeds capacity {capacity} of room {room_id}"
            ),
            EngineError::PaymentDeclined(id) => {
                write!(f, "payment declined for reservation {id}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
