use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::info;

use crate::model::*;
use crate::wal::Wal;

use super::{MemoryStore, ReservationStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush so partially buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = wal.rewrite(&events);
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Durable store: a `MemoryStore` materialized from an append-only WAL.
/// A save is visible only after its WAL record is fsynced.
pub struct WalStore {
    shared: Arc<Shared>,
}

struct Shared {
    state: MemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Serializes check → append → apply per room.
    room_locks: DashMap<RoomId, Arc<Mutex<()>>>,
    /// Saves hold it shared; compaction holds it exclusively so the snapshot
    /// cannot miss a record that is on disk but not yet applied.
    compaction: RwLock<()>,
}

impl WalStore {
    /// Replay the WAL at `path` and spawn its writer task. Must be called
    /// inside a Tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let state = MemoryStore::from_events(&events);
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));
        info!(path = %path.display(), events = events.len(), "WAL replayed");

        Ok(Self {
            shared: Arc::new(Shared {
                state,
                wal_tx,
                room_locks: DashMap::new(),
                compaction: RwLock::new(()),
            }),
        })
    }

    /// Run a write on its own task. A caller that gives up (timeout, drop)
    /// cannot leave a record on disk that was never applied in memory.
    async fn detached<F, Fut>(&self, write: F) -> Result<(), StoreError>
    where
        F: FnOnce(Arc<Shared>) -> Fut,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        tokio::spawn(write(self.shared.clone()))
            .await
            .map_err(|e| StoreError::Io(format!("WAL write task failed: {e}")))?
    }

    /// Rewrite the WAL with one record per live entity.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let shared = &self.shared;
        let _exclusive = shared.compaction.write().await;
        let events = shared.state.snapshot_events();
        let (tx, rx) = oneshot::channel();
        shared
            .wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Io("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Io("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .shared
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

impl Shared {
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Io("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Io("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn append_and_apply(&self, event: Event) -> Result<(), StoreError> {
        let _shared = self.compaction.read().await;
        self.wal_append(&event).await?;
        self.state.apply(&event);
        Ok(())
    }

    fn room_lock(&self, room_id: &RoomId) -> Arc<Mutex<()>> {
        self.room_locks.entry(room_id.clone()).or_default().value().clone()
    }

    async fn save_reservation(&self, reservation: Reservation) -> Result<(), StoreError> {
        let lock = self.room_lock(&reservation.room_id);
        let _room = lock.lock().await;
        self.state.check(&reservation)?;
        self.append_and_apply(Event::ReservationSaved { reservation })
            .await
    }
}

#[async_trait]
impl ReservationStore for WalStore {
    async fn load_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.shared.state.rooms())
    }

    async fn save_room(&self, room: &Room) -> Result<(), StoreError> {
        let event = Event::RoomSaved { room: room.clone() };
        self.detached(|shared| async move { shared.append_and_apply(event).await })
            .await
    }

    async fn load_guests(&self) -> Result<Vec<Guest>, StoreError> {
        Ok(self.shared.state.guests())
    }

    async fn save_guest(&self, guest: &Guest) -> Result<(), StoreError> {
        let event = Event::GuestSaved { guest: guest.clone() };
        self.detached(|shared| async move { shared.append_and_apply(event).await })
            .await
    }

    async fn load(&self, room_id: &RoomId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.shared.state.reservations(room_id))
    }

    async fn save(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let reservation = reservation.clone();
        self.detached(|shared| async move { shared.save_reservation(reservation).await })
            .await
    }
}
