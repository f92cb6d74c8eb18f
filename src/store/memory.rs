use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::*;

use super::{check_commit, ReservationStore, StoreError};

/// Process-local store. Also the materialized state behind `WalStore`.
pub struct MemoryStore {
    rooms: DashMap<RoomId, Room>,
    guests: DashMap<GuestId, Guest>,
    reservations: DashMap<RoomId, Vec<Reservation>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            guests: DashMap::new(),
            reservations: DashMap::new(),
        }
    }

    /// Rebuild from a replayed event log.
    pub fn from_events(events: &[Event]) -> Self {
        let store = Self::new();
        for event in events {
            store.apply(event);
        }
        store
    }

    /// Validate without applying. The caller must serialize check + apply per room.
    pub fn check(&self, reservation: &Reservation) -> Result<(), StoreError> {
        match self.reservations.get(&reservation.room_id) {
            Some(stored) => check_commit(&stored, reservation),
            None => check_commit(&[], reservation),
        }
    }

    /// Check and apply atomically under the room's map shard lock.
    pub fn commit(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut stored = self.reservations.entry(reservation.room_id.clone()).or_default();
        check_commit(&stored, reservation)?;
        upsert_sorted(&mut stored, reservation.clone());
        Ok(())
    }

    /// Apply unconditionally (replay, or after a successful `check`).
    pub fn apply(&self, event: &Event) {
        match event {
            Event::RoomSaved { room } => {
                self.rooms.insert(room.id.clone(), room.clone());
            }
            Event::GuestSaved { guest } => {
                self.guests.insert(guest.id.clone(), guest.clone());
            }
            Event::ReservationSaved { reservation } => {
                let mut stored = self.reservations.entry(reservation.room_id.clone()).or_default();
                upsert_sorted(&mut stored, reservation.clone());
            }
        }
    }

    /// Minimal event set that recreates the current state: one record per entity.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        let mut guests: Vec<Guest> = self.guests.iter().map(|e| e.value().clone()).collect();
        guests.sort_by(|a, b| a.id.cmp(&b.id));

        let mut events: Vec<Event> = rooms.into_iter().map(|room| Event::RoomSaved { room }).collect();
        events.extend(guests.into_iter().map(|guest| Event::GuestSaved { guest }));

        let mut room_ids: Vec<RoomId> = self.reservations.iter().map(|e| e.key().clone()).collect();
        room_ids.sort();
        for room_id in room_ids {
            if let Some(stored) = self.reservations.get(&room_id) {
                events.extend(stored.iter().map(|r| Event::ReservationSaved {
                    reservation: r.clone(),
                }));
            }
        }
        events
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn guests(&self) -> Vec<Guest> {
        self.guests.iter().map(|e| e.value().clone()).collect()
    }

    pub fn reservations(&self, room_id: &RoomId) -> Vec<Reservation> {
        self.reservations
            .get(room_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn load_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.rooms())
    }

    async fn save_room(&self, room: &Room) -> Result<(), StoreError> {
        self.apply(&Event::RoomSaved { room: room.clone() });
        Ok(())
    }

    async fn load_guests(&self) -> Result<Vec<Guest>, StoreError> {
        Ok(self.guests())
    }

    async fn save_guest(&self, guest: &Guest) -> Result<(), StoreError> {
        self.apply(&Event::GuestSaved { guest: guest.clone() });
        Ok(())
    }

    async fn load(&self, room_id: &RoomId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.reservations(room_id))
    }

    async fn save(&self, reservation: &Reservation) -> Result<(), StoreError> {
        self.commit(reservation)
    }
}
