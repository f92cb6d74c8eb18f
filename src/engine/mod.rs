mod availability;
mod booking;
mod error;
mod inventory;
pub mod lifecycle;
mod queries;

pub use availability::{free_stays, merge_overlapping, subtract_stays};
pub use error::{EngineError, Entity};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::payment::{AcceptAll, PaymentAuthorizer};
use crate::store::{ReservationStore, StoreError};

/// One room's inventory facts plus its reservations. Writers (book, cancel,
/// front-desk transitions, rate changes) take the write lock; that lock is
/// the per-room critical section.
pub type SharedLedger = Arc<RwLock<RoomLedger>>;

pub struct EngineOptions {
    pub payments: Arc<dyn PaymentAuthorizer>,
    pub clock: Arc<dyn Clock>,
    pub notify: Arc<NotifyHub>,
    pub persist_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            payments: Arc::new(AcceptAll),
            clock: Arc::new(SystemClock),
            notify: Arc::new(NotifyHub::new()),
            persist_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Engine {
    pub(super) ledgers: DashMap<RoomId, SharedLedger>,
    /// Reverse lookup: reservation id → room id
    pub(super) reservation_rooms: DashMap<ReservationId, RoomId>,
    pub(super) guests: DashMap<GuestId, Guest>,
    /// Rooms accepting bookings. Adjusted under the room's write lock.
    pub(super) active_rooms: AtomicUsize,
    /// Serializes room creation so duplicate ids are rejected before they reach the store.
    pub(super) inventory_lock: Mutex<()>,
    pub(super) store: Arc<dyn ReservationStore>,
    pub(super) payments: Arc<dyn PaymentAuthorizer>,
    pub(super) clock: Arc<dyn Clock>,
    pub notify: Arc<NotifyHub>,
    pub(super) persist_timeout: Duration,
}

impl Engine {
    /// Load rooms, guests and every room's reservations from the store.
    pub async fn open(
        store: Arc<dyn ReservationStore>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let engine = Self {
            ledgers: DashMap::new(),
            reservation_rooms: DashMap::new(),
            guests: DashMap::new(),
            active_rooms: AtomicUsize::new(0),
            inventory_lock: Mutex::new(()),
            store,
            payments: options.payments,
            clock: options.clock,
            notify: options.notify,
            persist_timeout: options.persist_timeout,
        };

        let rooms = engine
            .bounded("load rooms", engine.store.load_rooms())
            .await?
            .map_err(storage)?;
        for room in rooms {
            let reservations = engine
                .bounded("load reservations", engine.store.load(&room.id))
                .await?
                .map_err(storage)?;
            for r in &reservations {
                engine.reservation_rooms.insert(r.id, room.id.clone());
            }
            if room.active {
                engine.active_rooms.fetch_add(1, Ordering::SeqCst);
            }
            let room_id = room.id.clone();
            let ledger = RoomLedger::with_reservations(room, reservations);
            engine.ledgers.insert(room_id, Arc::new(RwLock::new(ledger)));
        }

        let guests = engine
            .bounded("load guests", engine.store.load_guests())
            .await?
            .map_err(storage)?;
        for guest in guests {
            engine.guests.insert(guest.id.clone(), guest);
        }

        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(engine.active_room_count() as f64);
        info!(
            rooms = engine.ledgers.len(),
            reservations = engine.reservation_rooms.len(),
            guests = engine.guests.len(),
            "engine loaded"
        );
        Ok(engine)
    }

    pub fn get_ledger(&self, room_id: &RoomId) -> Option<SharedLedger> {
        self.ledgers.get(room_id).map(|e| e.value().clone())
    }

    pub(super) fn ledger(&self, room_id: &RoomId) -> Result<SharedLedger, EngineError> {
        self.get_ledger(room_id)
            .ok_or_else(|| EngineError::NotFound(Entity::Room(room_id.clone())))
    }

    pub fn get_room_for_reservation(&self, id: &ReservationId) -> Option<RoomId> {
        self.reservation_rooms.get(id).map(|e| e.value().clone())
    }

    /// Snapshot of every ledger handle, sorted by room id. Collected up front
    /// so no map guard is held across an await.
    pub(super) fn all_ledgers(&self) -> Vec<(RoomId, SharedLedger)> {
        let mut all: Vec<_> = self
            .ledgers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Run a collaborator call under the persist timeout.
    pub(super) async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = T>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.persist_timeout, fut).await {
            Ok(out) => Ok(out),
            Err(_) => {
                warn!(op, timeout_ms = self.persist_timeout.as_millis() as u64, "collaborator call timed out");
                metrics::counter!(crate::observability::TIMEOUTS_TOTAL, "op" => op).increment(1);
                Err(EngineError::Timeout(op))
            }
        }
    }

    /// Persist the next state of reservation `id` and publish it to the ledger.
    ///
    /// `next` builds the candidate from the reservation's current state
    /// (`None` for a new one). On a store conflict the ledger is reloaded and
    /// `next` runs again against the stored version, so the one retry saves a
    /// fresh version. A blocking candidate that overlaps another reservation
    /// is `RoomUnavailable` on either attempt.
    pub(super) async fn commit(
        &self,
        ledger: &mut RoomLedger,
        id: ReservationId,
        next: impl Fn(Option<&Reservation>) -> Result<Reservation, EngineError>,
    ) -> Result<Reservation, EngineError> {
        let candidate = next(ledger.get(id))?;
        check_overlap(ledger, &candidate)?;

        let committed = match self
            .bounded("save reservation", self.store.save(&candidate))
            .await?
        {
            Ok(()) => candidate,
            Err(StoreError::Conflict { reason, .. }) => {
                warn!(reservation = %id, room = %ledger.room.id, reason, "store conflict, reloading room");
                self.reload(ledger).await?;
                if ledger.get(id) == Some(&candidate) {
                    // An earlier attempt at this exact save landed late.
                    candidate
                } else {
                    self.retry(ledger, id, &next).await?
                }
            }
            Err(e) => return Err(storage(e)),
        };

        self.publish(ledger, &committed);
        Ok(committed)
    }

    async fn retry(
        &self,
        ledger: &RoomLedger,
        id: ReservationId,
        next: &impl Fn(Option<&Reservation>) -> Result<Reservation, EngineError>,
    ) -> Result<Reservation, EngineError> {
        let candidate = next(ledger.get(id))?;
        if let Err(e) = check_overlap(ledger, &candidate) {
            metrics::counter!(crate::observability::STORE_CONFLICTS_TOTAL, "outcome" => "unavailable")
                .increment(1);
            return Err(e);
        }
        match self
            .bounded("save reservation", self.store.save(&candidate))
            .await?
        {
            Ok(()) => {
                metrics::counter!(crate::observability::STORE_CONFLICTS_TOTAL, "outcome" => "retried")
                    .increment(1);
                Ok(candidate)
            }
            Err(StoreError::Conflict { .. }) => {
                metrics::counter!(crate::observability::STORE_CONFLICTS_TOTAL, "outcome" => "surfaced")
                    .increment(1);
                Err(EngineError::PersistenceConflict(id))
            }
            Err(e) => Err(storage(e)),
        }
    }

    fn publish(&self, ledger: &mut RoomLedger, reservation: &Reservation) {
        ledger.upsert(reservation.clone());
        self.reservation_rooms
            .insert(reservation.id, reservation.room_id.clone());
        metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "to" => reservation.status.label())
            .increment(1);
        if let Some(last) = reservation.history.last() {
            info!(
                reservation = %reservation.id,
                room = %reservation.room_id,
                guest = %reservation.guest_id,
                stay = %reservation.stay,
                version = reservation.version,
                from = last.from.map_or("new", |s| s.label()),
                to = %last.to,
                at = %last.at,
                "reservation transition"
            );
        }
        self.notify.send(
            &reservation.room_id,
            &Event::ReservationSaved {
                reservation: reservation.clone(),
            },
        );
    }

    /// Replace the ledger's reservations with the store's view of the room.
    pub(super) async fn reload(&self, ledger: &mut RoomLedger) -> Result<(), EngineError> {
        let reservations = self
            .bounded("load reservations", self.store.load(&ledger.room.id))
            .await?
            .map_err(storage)?;
        for r in &reservations {
            self.reservation_rooms.insert(r.id, ledger.room.id.clone());
        }
        *ledger = RoomLedger::with_reservations(ledger.room.clone(), reservations);
        Ok(())
    }

    /// Number of rooms currently accepting bookings.
    pub fn active_room_count(&self) -> usize {
        self.active_rooms.load(Ordering::SeqCst)
    }

    /// Count a room entering or leaving service. Callers hold the room's
    /// write lock, so each flip is counted exactly once.
    pub(super) fn count_active(&self, entering: bool) {
        let gauge = metrics::gauge!(crate::observability::ROOMS_ACTIVE);
        if entering {
            self.active_rooms.fetch_add(1, Ordering::SeqCst);
            gauge.increment(1.0);
        } else {
            self.active_rooms.fetch_sub(1, Ordering::SeqCst);
            gauge.decrement(1.0);
        }
    }
}

fn check_overlap(ledger: &RoomLedger, candidate: &Reservation) -> Result<(), EngineError> {
    if candidate.status.is_blocking()
        && let Some(other) = ledger.first_conflict(&candidate.stay, Some(candidate.id))
    {
        return Err(EngineError::RoomUnavailable {
            room_id: candidate.room_id.clone(),
            conflicting: other.id,
        });
    }
    Ok(())
}

pub(super) fn storage(e: StoreError) -> EngineError {
    match e {
        StoreError::Conflict { id, .. } => EngineError::PersistenceConflict(id),
        StoreError::Io(msg) => EngineError::Storage(msg),
    }
}
