use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::lifecycle::{can_transition, extend, transition};
use super::{Engine, EngineError, Entity, SharedLedger};

/// Attempts to cancel a failed booking before giving up on it.
const ABANDON_ATTEMPTS: u32 = 4;

impl Engine {
    /// Book `room_id` for one guest over `[check_in, check_out)`.
    pub async fn book(
        &self,
        room_id: &RoomId,
        guest_id: &GuestId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Reservation, EngineError> {
        self.book_party(room_id, guest_id, check_in, check_out, 1).await
    }

    /// Book for a party of `party_size`, which must fit the room's capacity.
    pub async fn book_party(
        &self,
        room_id: &RoomId,
        guest_id: &GuestId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        party_size: u32,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        let result = self
            .try_book(room_id, guest_id, check_in, check_out, party_size)
            .await;
        metrics::histogram!(crate::observability::BOOK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        let outcome = crate::observability::outcome_label(&result.as_ref().map(|_| ()));
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        if let Err(e) = &result {
            debug!(room = %room_id, guest = %guest_id, %check_in, %check_out, error = %e, "booking rejected");
        }
        result
    }

    async fn try_book(
        &self,
        room_id: &RoomId,
        guest_id: &GuestId,
        check_in: NaiveDate,
        check_out: NaiveDate,
        party_size: u32,
    ) -> Result<Reservation, EngineError> {
        let stay = self.validate_stay(check_in, check_out)?;
        if guest_id.0.is_empty() || guest_id.0.len() > MAX_ID_LEN {
            return Err(EngineError::LimitExceeded("guest id length"));
        }
        let ledger = self.ledger(room_id)?;

        // Per-room critical section: re-check, persist Pending, authorize,
        // persist Confirmed. Released on every exit path when `guard` drops.
        let mut guard = ledger.write().await;
        if !guard.room.active {
            return Err(EngineError::RoomInactive(room_id.clone()));
        }
        if party_size == 0 || party_size > guard.room.capacity {
            return Err(EngineError::CapacityExceeded {
                room_id: room_id.clone(),
                capacity: guard.room.capacity,
                party_size,
            });
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }
        if guard.first_conflict(&stay, None).is_some() {
            // The ledger can lag the store after a timed-out cancel; confirm
            // against the store before turning the guest away.
            self.reload(&mut guard).await?;
            if let Some(existing) = guard.first_conflict(&stay, None) {
                return Err(EngineError::RoomUnavailable {
                    room_id: room_id.clone(),
                    conflicting: existing.id,
                });
            }
        }

        let pending = Reservation::pending(
            Ulid::new(),
            room_id.clone(),
            guest_id.clone(),
            stay,
            party_size,
            self.clock.now(),
        );
        let id = pending.id;
        let pending = match self.commit(&mut guard, id, |_| Ok(pending.clone())).await {
            Ok(pending) => pending,
            Err(e) => {
                self.abandon(&mut guard, id).await;
                return Err(e);
            }
        };

        match self
            .bounded("payment authorization", self.payments.authorize(&pending))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(reservation = %id, room = %room_id, "payment declined");
                self.abandon(&mut guard, id).await;
                return Err(EngineError::PaymentDeclined(id));
            }
            Err(e) => {
                self.abandon(&mut guard, id).await;
                return Err(e);
            }
        }

        let confirmed = moved_to(id, ReservationStatus::Confirmed, self.clock.now());
        match self.commit(&mut guard, id, confirmed).await {
            Ok(reservation) => Ok(reservation),
            Err(e) => {
                self.abandon(&mut guard, id).await;
                Err(e)
            }
        }
    }

    /// Cancel a reservation whose booking failed, starting from whatever the
    /// store settled on. A timed-out save can still land (a Pending or a
    /// Confirmed), so each attempt reloads the room first.
    async fn abandon(&self, ledger: &mut RoomLedger, id: ReservationId) {
        for attempt in 1..=ABANDON_ATTEMPTS {
            if let Err(e) = self.reload(ledger).await {
                warn!(reservation = %id, attempt, error = %e, "reload before abandon failed");
                continue;
            }
            match ledger.get(id) {
                Some(r) if can_transition(r.status, ReservationStatus::Cancelled) => {}
                _ => return,
            }
            let cancelled = moved_to(id, ReservationStatus::Cancelled, self.clock.now());
            match self.commit(ledger, id, cancelled).await {
                Ok(_) => return,
                Err(e) => {
                    warn!(reservation = %id, attempt, error = %e, "could not record abandoned reservation");
                }
            }
        }
        error!(reservation = %id, room = %ledger.room.id, "abandoned reservation may still hold its room");
    }

    /// Cancel a Pending or Confirmed reservation. Its nights become bookable
    /// as soon as this returns.
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.advance(id, ReservationStatus::Cancelled).await
    }

    /// Front desk: Confirmed → CheckedIn.
    pub async fn check_in(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.advance(id, ReservationStatus::CheckedIn).await
    }

    /// Front desk: CheckedIn → CheckedOut.
    pub async fn check_out(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.advance(id, ReservationStatus::CheckedOut).await
    }

    /// Move a Confirmed or CheckedIn stay's check-out later. The added
    /// nights must be free.
    pub async fn extend_stay(
        &self,
        id: ReservationId,
        new_check_out: NaiveDate,
    ) -> Result<Reservation, EngineError> {
        let ledger = self.reservation_ledger(id)?;
        let mut guard = ledger.write().await;
        let at = self.clock.now();
        self.commit(&mut guard, id, |current| {
            let mut next = current
                .cloned()
                .ok_or(EngineError::NotFound(Entity::Reservation(id)))?;
            extend(&mut next, new_check_out, at)?;
            Ok(next)
        })
        .await
    }

    async fn advance(
        &self,
        id: ReservationId,
        to: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let ledger = self.reservation_ledger(id)?;
        let mut guard = ledger.write().await;
        self.commit(&mut guard, id, moved_to(id, to, self.clock.now()))
            .await
    }

    fn reservation_ledger(&self, id: ReservationId) -> Result<SharedLedger, EngineError> {
        let room_id = self
            .get_room_for_reservation(&id)
            .ok_or(EngineError::NotFound(Entity::Reservation(id)))?;
        self.ledger(&room_id)
    }

    /// Check-in before check-out, not in the past, not too long.
    pub(super) fn validate_stay(
        &self,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Stay, EngineError> {
        let invalid = |reason| EngineError::InvalidRange {
            check_in,
            check_out,
            reason,
        };
        if check_in >= check_out {
            return Err(invalid("check-in must be before check-out"));
        }
        if check_in < self.clock.today() {
            return Err(invalid("stay starts in the past"));
        }
        if (check_out - check_in).num_days() > MAX_STAY_NIGHTS {
            return Err(invalid("stay too long"));
        }
        Ok(Stay::new(check_in, check_out))
    }
}

/// Builds the next state of reservation `id` by moving its current state to `to`.
fn moved_to(
    id: ReservationId,
    to: ReservationStatus,
    at: DateTime<Utc>,
) -> impl Fn(Option<&Reservation>) -> Result<Reservation, EngineError> {
    move |current| {
        let mut next = current
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Reservation(id)))?;
        transition(&mut next, to, at)?;
        Ok(next)
    }
}
