mod memory;
mod wal_store;

pub use memory::MemoryStore;
pub use wal_store::WalStore;

use async_trait::async_trait;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another writer got there first: the stored version moved on, or a
    /// blocking reservation on the same room now overlaps this one.
    Conflict {
        id: ReservationId,
        reason: &'static str,
    },
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict { id, reason } => write!(f, "conflict saving {id}: {reason}"),
            StoreError::Io(e) => write!(f, "store I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence collaborator. `save` must be serializable per room: it accepts
/// a reservation only if its version follows the stored one and, for
/// Confirmed/CheckedIn, no other blocking reservation on the room overlaps it.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn load_rooms(&self) -> Result<Vec<Room>, StoreError>;
    async fn save_room(&self, room: &Room) -> Result<(), StoreError>;
    async fn load_guests(&self) -> Result<Vec<Guest>, StoreError>;
    async fn save_guest(&self, guest: &Guest) -> Result<(), StoreError>;
    /// All reservations for a room, ordered by check-in.
    async fn load(&self, room_id: &RoomId) -> Result<Vec<Reservation>, StoreError>;
    async fn save(&self, reservation: &Reservation) -> Result<(), StoreError>;
}

/// Validate `candidate` against the stored reservations of its room.
pub(crate) fn check_commit(stored: &[Reservation], candidate: &Reservation) -> Result<(), StoreError> {
    let current = stored.iter().find(|r| r.id == candidate.id).map_or(0, |r| r.version);
    if candidate.version != current + 1 {
        return Err(StoreError::Conflict {
            id: candidate.id,
            reason: "stale version",
        });
    }
    if candidate.status.is_blocking()
        && stored
            .iter()
            .any(|r| r.id != candidate.id && r.blocks(&candidate.stay))
    {
        return Err(StoreError::Conflict {
            id: candidate.id,
            reason: "overlapping stay",
        });
    }
    Ok(())
}
