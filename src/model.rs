use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type ReservationId = Ulid;

/// Integer minor currency units (cents).
pub type Money = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuestId(pub String);

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for GuestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open date range `[check_in, check_out)`. The guest sleeps the nights
/// starting on `check_in` up to, but not including, `check_out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "Stay check_in must be before check_out");
        Self { check_in, check_out }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// True if the night starting on `date` is part of this stay.
    pub fn covers_night(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }
}

impl fmt::Display for Stay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomType {
    Single,
    Double,
    Twin,
    Suite,
    Deluxe,
    Family,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub room_type: RoomType,
    /// Max number of guests.
    pub capacity: u32,
    pub base_rate: Money,
    /// Inactive rooms are out of order: never available, never bookable.
    pub active: bool,
}

impl Room {
    pub fn new(id: impl Into<RoomId>, room_type: RoomType, capacity: u32, base_rate: Money) -> Self {
        Self {
            id: id.into(),
            room_type,
            capacity,
            base_rate,
            active: true,
        }
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl ReservationStatus {
    /// Statuses that occupy the room and take part in the no-overlap invariant.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Confirmed | Self::CheckedIn)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CheckedOut | Self::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::CheckedIn => "checked_in",
            Self::CheckedOut => "checked_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One audit entry. `from` is `None` for the creating transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Option<ReservationStatus>,
    pub to: ReservationStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub room_id: RoomId,
    pub guest_id: GuestId,
    pub stay: Stay,
    pub party_size: u32,
    pub status: ReservationStatus,
    /// Bumped on every transition; the store rejects stale versions.
    pub version: u64,
    pub history: Vec<Transition>,
}

impl Reservation {
    pub fn pending(
        id: ReservationId,
        room_id: RoomId,
        guest_id: GuestId,
        stay: Stay,
        party_size: u32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            room_id,
            guest_id,
            stay,
            party_size,
            status: ReservationStatus::Pending,
            version: 1,
            history: vec![Transition {
                from: None,
                to: ReservationStatus::Pending,
                at,
            }],
        }
    }

    /// True if this reservation holds the room for any night of `stay`.
    pub fn blocks(&self, stay: &Stay) -> bool {
        self.status.is_blocking() && self.stay.overlaps(stay)
    }
}

/// All reservations for one room, sorted by `stay.check_in`. Guarded by the
/// room's lock inside the engine.
#[derive(Debug, Clone)]
pub struct RoomLedger {
    pub room: Room,
    pub reservations: Vec<Reservation>,
}

impl RoomLedger {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            reservations: Vec::new(),
        }
    }

    pub fn with_reservations(room: Room, mut reservations: Vec<Reservation>) -> Self {
        reservations.sort_by_key(|r| r.stay.check_in);
        Self { room, reservations }
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Insert or replace by id, keeping sort order by check-in.
    pub fn upsert(&mut self, reservation: Reservation) {
        upsert_sorted(&mut self.reservations, reservation);
    }

    /// Reservations whose stay overlaps `query`, regardless of status.
    /// Uses binary search to skip reservations checking in at or after `query.check_out`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.stay.check_in < query.check_out);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.stay.check_out > query.check_in)
    }

    /// First blocking reservation overlapping `stay`, ignoring `exclude`.
    pub fn first_conflict(&self, stay: &Stay, exclude: Option<ReservationId>) -> Option<&Reservation> {
        self.overlapping(stay)
            .find(|r| r.status.is_blocking() && Some(r.id) != exclude)
    }
}

/// Insert or replace by id in a list kept sorted by check-in.
pub fn upsert_sorted(reservations: &mut Vec<Reservation>, reservation: Reservation) {
    if let Some(pos) = reservations.iter().position(|r| r.id == reservation.id) {
        reservations.remove(pos);
    }
    let pos = reservations
        .binary_search_by_key(&reservation.stay.check_in, |r| r.stay.check_in)
        .unwrap_or_else(|e| e);
    reservations.insert(pos, reservation);
}

/// WAL record format. Every record carries the full latest state of one
/// entity, so replay is "last write wins" per id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomSaved { room: Room },
    GuestSaved { guest: Guest },
    ReservationSaved { reservation: Reservation },
}

// ── Query types ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomFilter {
    pub room_type: Option<RoomType>,
    pub min_capacity: Option<u32>,
    pub include_inactive: bool,
}

impl RoomFilter {
    pub fn of_type(room_type: RoomType) -> Self {
        Self {
            room_type: Some(room_type),
            ..Self::default()
        }
    }

    pub fn matches(&self, room: &Room) -> bool {
        (self.include_inactive || room.active)
            && self.room_type.is_none_or(|t| t == room.room_type)
            && self.min_capacity.is_none_or(|c| room.capacity >= c)
    }
}

/// A snapshot of the inventory, sorted by room id, filtered lazily on each
/// iteration. Iterating again restarts from the first room.
#[derive(Debug, Clone)]
pub struct RoomList {
    rooms: Vec<Room>,
    filter: RoomFilter,
}

impl RoomList {
    pub fn new(mut rooms: Vec<Room>, filter: RoomFilter) -> Self {
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        Self { rooms, filter }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter().filter(|r| self.filter.matches(r))
    }
}

impl<'a> IntoIterator for &'a RoomList {
    type Item = &'a Room;
    type IntoIter = Box<dyn Iterator<Item = &'a Room> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub date: NaiveDate,
    pub active_rooms: usize,
    pub occupied_rooms: usize,
}
