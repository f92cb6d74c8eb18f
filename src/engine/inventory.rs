use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::{storage, Engine, EngineError, Entity};

impl Engine {
    pub async fn add_room(&self, room: Room) -> Result<(), EngineError> {
        if room.id.0.is_empty() || room.id.0.len() > MAX_ID_LEN {
            return Err(EngineError::LimitExceeded("room id length"));
        }
        if room.capacity == 0 {
            return Err(EngineError::LimitExceeded("room capacity must be positive"));
        }

        let _inventory = self.inventory_lock.lock().await;
        if self.ledgers.contains_key(&room.id) {
            return Err(EngineError::DuplicateRoom(room.id));
        }
        if self.ledgers.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        self.bounded("save room", self.store.save_room(&room))
            .await?
            .map_err(storage)?;
        info!(room = %room.id, room_type = ?room.room_type, capacity = room.capacity, "room added");
        let event = Event::RoomSaved { room: room.clone() };
        if room.active {
            self.count_active(true);
        }
        self.ledgers
            .insert(room.id.clone(), Arc::new(RwLock::new(RoomLedger::new(room.clone()))));
        self.notify.send(&room.id, &event);
        Ok(())
    }

    pub async fn get_room(&self, room_id: &RoomId) -> Result<Room, EngineError> {
        let ledger = self.ledger(room_id)?;
        let guard = ledger.read().await;
        Ok(guard.room.clone())
    }

    /// Rooms matching `filter`, ascending by id. The result is a snapshot
    /// that can be iterated any number of times.
    pub async fn list_rooms(&self, filter: RoomFilter) -> RoomList {
        let mut rooms = Vec::with_capacity(self.ledgers.len());
        for (_, ledger) in self.all_ledgers() {
            rooms.push(ledger.read().await.room.clone());
        }
        RoomList::new(rooms, filter)
    }

    pub async fn update_rate(&self, room_id: &RoomId, base_rate: Money) -> Result<Room, EngineError> {
        self.update_room(room_id, |_, room| {
            room.base_rate = base_rate;
            Ok(())
        })
        .await
    }

    /// Take a room out of service. Refused while a Confirmed/CheckedIn
    /// reservation on it has nights left.
    pub async fn deactivate_room(&self, room_id: &RoomId) -> Result<Room, EngineError> {
        let today = self.clock.today();
        self.update_room(room_id, |ledger, room| {
            if let Some(r) = ledger
                .reservations
                .iter()
                .find(|r| r.status.is_blocking() && r.stay.check_out > today)
            {
                return Err(EngineError::RoomInUse {
                    room_id: room.id.clone(),
                    reservation: r.id,
                });
            }
            room.active = false;
            Ok(())
        })
        .await
    }

    pub async fn reactivate_room(&self, room_id: &RoomId) -> Result<Room, EngineError> {
        self.update_room(room_id, |_, room| {
            room.active = true;
            Ok(())
        })
        .await
    }

    /// Apply `change` to a copy of the room under the room's write lock,
    /// persist it, then publish it to the ledger.
    async fn update_room(
        &self,
        room_id: &RoomId,
        change: impl FnOnce(&RoomLedger, &mut Room) -> Result<(), EngineError>,
    ) -> Result<Room, EngineError> {
        let ledger = self.ledger(room_id)?;
        let mut guard = ledger.write().await;
        let mut room = guard.room.clone();
        change(&*guard, &mut room)?;
        self.bounded("save room", self.store.save_room(&room))
            .await?
            .map_err(storage)?;
        if guard.room.active != room.active {
            self.count_active(room.active);
        }
        guard.room = room.clone();
        info!(room = %room.id, base_rate = room.base_rate, active = room.active, "room updated");
        self.notify.send(room_id, &Event::RoomSaved { room: room.clone() });
        Ok(room)
    }

    /// Register or replace a guest's contact details.
    pub async fn register_guest(&self, guest: Guest) -> Result<(), EngineError> {
        if guest.id.0.is_empty() || guest.id.0.len() > MAX_ID_LEN {
            return Err(EngineError::LimitExceeded("guest id length"));
        }
        let too_long = |s: &Option<String>| s.as_ref().is_some_and(|s| s.len() > MAX_NAME_LEN);
        if guest.name.len() > MAX_NAME_LEN || too_long(&guest.email) || too_long(&guest.phone) {
            return Err(EngineError::LimitExceeded("guest contact field too long"));
        }
        self.bounded("save guest", self.store.save_guest(&guest))
            .await?
            .map_err(storage)?;
        self.guests.insert(guest.id.clone(), guest);
        Ok(())
    }

    pub fn get_guest(&self, guest_id: &GuestId) -> Result<Guest, EngineError> {
        self.guests
            .get(guest_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::NotFound(Entity::Guest(guest_id.clone())))
    }

    pub fn room_count(&self) -> usize {
        self.ledgers.len()
    }
}
