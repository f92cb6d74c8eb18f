use chrono::NaiveDate;

use crate::model::*;

use super::{Engine, EngineError, Entity};

impl Engine {
    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let not_found = || EngineError::NotFound(Entity::Reservation(id));
        let room_id = self.get_room_for_reservation(&id).ok_or_else(not_found)?;
        let ledger = self.ledger(&room_id)?;
        let guard = ledger.read().await;
        guard.get(id).cloned().ok_or_else(not_found)
    }

    /// Every reservation on a room, any status, in check-in order.
    pub async fn reservations_for_room(&self, room_id: &RoomId) -> Result<Vec<Reservation>, EngineError> {
        let ledger = self.ledger(room_id)?;
        let guard = ledger.read().await;
        Ok(guard.reservations.clone())
    }

    /// A guest's reservations across all rooms, ordered by check-in then room.
    pub async fn reservations_for_guest(&self, guest_id: &GuestId) -> Vec<Reservation> {
        self.collect(|r| &r.guest_id == guest_id).await
    }

    /// Confirmed reservations due to check in on `date`.
    pub async fn arrivals(&self, date: NaiveDate) -> Vec<Reservation> {
        self.collect(|r| r.status == ReservationStatus::Confirmed && r.stay.check_in == date)
            .await
    }

    /// Checked-in reservations due to check out on `date`.
    pub async fn departures(&self, date: NaiveDate) -> Vec<Reservation> {
        self.collect(|r| r.status == ReservationStatus::CheckedIn && r.stay.check_out == date)
            .await
    }

    async fn collect(&self, pred: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut out = Vec::new();
        for (_, ledger) in self.all_ledgers() {
            let guard = ledger.read().await;
            out.extend(guard.reservations.iter().filter(|r| pred(r)).cloned());
        }
        // Rooms are visited in id order, so a stable sort keeps that as the tie-break.
        out.sort_by_key(|r| r.stay.check_in);
        out
    }
}
