mod accounts;
mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use conflict::today;
pub use error::{EngineError, ErrorKind};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use ulid::Ulid;

use crate::limits::WAL_CHANNEL_CAPACITY;
use crate::model::*;
use crate::wal::Wal;

use store::Store;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is in progress are
/// committed together with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so a partial batch never leaks into the next one.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL commit of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The front-desk core: persistence gateway, availability and booking lifecycle
/// over one WAL-backed store.
pub struct Engine {
    pub(super) store: Store,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Held shared by every write from WAL append to in-memory apply, and
    /// exclusively by compaction and by writes that must not interleave.
    commit_gate: RwLock<()>,
}

/// Room that a room-scoped event touches. `None` for users and guests.
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomSaved { room } => Some(room.id),
        Event::RoomDeleted { id } | Event::RoomStatusSet { id, .. } => Some(*id),
        Event::BookingCreated { booking } => Some(booking.room_id),
        Event::BookingCheckedIn { room_id, .. }
        | Event::BookingCheckedOut { room_id, .. }
        | Event::PaymentRecorded { room_id, .. }
        | Event::PaymentMarkedPaid { room_id, .. } => Some(*room_id),
        Event::UserCreated { .. } | Event::GuestSaved { .. } | Event::GuestDeleted { .. } => None,
    }
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must be called
    /// inside a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Store::new();
        let replayed = events.len();

        // Rooms are rebuilt unlocked, then published behind their locks.
        let mut rooms: HashMap<Ulid, RoomState> = HashMap::new();
        for event in &events {
            match event {
                Event::RoomSaved { room } if !rooms.contains_key(&room.id) => {
                    store.index_room_number(&room.number, room.id);
                    rooms.insert(room.id, RoomState::new(room.clone()));
                }
                Event::RoomDeleted { id } => {
                    if let Some(rs) = rooms.remove(id) {
                        store.release_room_number(&rs.room.number, id);
                    }
                }
                other => match event_room_id(other) {
                    Some(room_id) => {
                        if let Some(rs) = rooms.get_mut(&room_id) {
                            store.apply_to_room(rs, other);
                        }
                    }
                    None => store.apply_global(other),
                },
            }
        }
        for (id, rs) in rooms {
            store.insert_room_state(id, rs);
        }

        tracing::info!(
            "replayed {replayed} events from {}: {} rooms, {} guests, {} users",
            wal_path.display(),
            store.room_count(),
            store.guest_count(),
            store.user_count()
        );

        Ok(Self {
            store,
            wal_tx,
            commit_gate: RwLock::new(()),
        })
    }

    pub(super) async fn begin_write(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate.read().await
    }

    pub(super) async fn begin_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.commit_gate.write().await
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply to a room the caller holds write-locked.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_room(rs, event);
        Ok(())
    }

    /// WAL-append then apply a user or guest event.
    pub(super) async fn persist_global(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_global(event);
        Ok(())
    }

    /// Booking → room, then write-lock the room. Fails if the booking is not
    /// (or not yet) in the room's list.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .store
            .room_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let rs = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let guard = rs.write_owned().await;
        if guard.booking(booking_id).is_none() {
            return Err(EngineError::BookingNotFound(*booking_id));
        }
        Ok((room_id, guard))
    }

    /// Rewrite the WAL as a snapshot of the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.begin_exclusive().await;

        let mut events = Vec::new();
        for user in self.store.users() {
            events.push(Event::UserCreated { user });
        }
        for guest in self.store.guests() {
            events.push(Event::GuestSaved { guest });
        }
        let mut payments = Vec::new();
        for rs in self.store.room_states() {
            let guard = rs.read().await;
            events.push(Event::RoomSaved {
                room: guard.room.clone(),
            });
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
                if let Some(payment) = self.store.payment(&booking.id) {
                    payments.push(Event::PaymentRecorded {
                        room_id: guard.room.id,
                        payment,
                    });
                }
            }
        }
        events.extend(payments);
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
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
