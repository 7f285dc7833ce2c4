mod compact;
mod conflict;
mod directory;
mod error;
mod lifecycle;
mod queries;
mod registration;

pub use conflict::find_conflict;
pub use error::{EngineError, Unavailable};

use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;
pub type SharedBookingState = Arc<RwLock<BookingState>>;

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

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Takes the first append, drains whatever else is already
/// queued, then does one fsync for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
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

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("wal flush of {} events failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let _ = tx.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-buffered bytes don't leak
    // into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// In-memory booking state made durable by a WAL.
///
/// Rooms and bookings each sit behind their own `RwLock`. Creating a booking
/// holds the room's write lock across conflict check, WAL append and apply;
/// registration does the same with the booking's lock. Unrelated rooms and
/// bookings never contend.
pub struct Engine {
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) bookings: DashMap<Ulid, SharedBookingState>,
    pub(super) organisers: DashMap<Ulid, Organiser>,
    pub(super) attendees: DashMap<Ulid, Attendee>,
    pub(super) usernames: DashMap<String, Ulid>,
    /// attendee → bookings. Derived from rosters; written only by `apply`.
    pub(super) attendee_bookings: DashMap<Ulid, BTreeSet<Ulid>>,
    /// Mutations hold this shared; compaction holds it exclusively so its
    /// snapshot matches the log it replaces.
    commit_gate: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must be called
    /// inside a tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::open_and_replay(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            bookings: DashMap::new(),
            organisers: DashMap::new(),
            attendees: DashMap::new(),
            usernames: DashMap::new(),
            attendee_bookings: DashMap::new(),
            commit_gate: RwLock::new(()),
            wal_tx,
        };

        // Sole owner of every Arc here, so try_write never contends. Never use
        // blocking_write: this may run inside an async context.
        for event in &events {
            let room = event_room_id(event).and_then(|id| engine.get_room_state(&id));
            let booking = event_booking_id(event).and_then(|id| engine.get_booking_state(&id));
            let mut room_guard = room.as_ref().and_then(|rs| rs.try_write().ok());
            let mut booking_guard = booking.as_ref().and_then(|bs| bs.try_write().ok());
            engine.apply(event, room_guard.as_deref_mut(), booking_guard.as_deref_mut());
        }
        tracing::info!(
            "replayed {} events: {} rooms, {} bookings",
            events.len(),
            engine.rooms.len(),
            engine.bookings.len()
        );

        Ok(engine)
    }

    /// Apply a committed event to memory. The caller holds the write locks of
    /// the room and booking the event touches and passes them in.
    fn apply(&self, event: &Event, room: Option<&mut RoomState>, booking: Option<&mut BookingState>) {
        match event {
            Event::RoomCreated { id, name, capacity } => {
                let rs = RoomState::new(Room {
                    id: *id,
                    name: name.clone(),
                    capacity: *capacity,
                    available: true,
                });
                self.rooms.insert(*id, Arc::new(RwLock::new(rs)));
            }
            Event::RoomAvailabilitySet { available, .. } => {
                if let Some(rs) = room {
                    rs.room.available = *available;
                }
            }
            Event::RoomDeleted { id } => {
                if let Some(rs) = room {
                    rs.deleted = true;
                }
                self.rooms.remove(id);
            }
            Event::OrganiserCreated { id, name, username } => {
                self.usernames.insert(username.clone(), *id);
                self.organisers.insert(
                    *id,
                    Organiser { id: *id, name: name.clone(), username: username.clone() },
                );
            }
            Event::AttendeeCreated { id, name, username } => {
                self.usernames.insert(username.clone(), *id);
                self.attendees.insert(
                    *id,
                    Attendee { id: *id, name: name.clone(), username: username.clone() },
                );
            }
            Event::BookingCreated { id, room_id, organiser_id, event_name, start, duration_minutes } => {
                let Some(rs) = room else { return };
                let booking = Booking {
                    id: *id,
                    event_name: event_name.clone(),
                    room_id: *room_id,
                    organiser_id: *organiser_id,
                    start: *start,
                    duration_minutes: *duration_minutes,
                };
                rs.insert_slot(Slot { booking_id: *id, span: booking.span() });
                let bs = BookingState::new(booking, rs.room.capacity);
                self.bookings.insert(*id, Arc::new(RwLock::new(bs)));
            }
            Event::BookingCancelled { id, .. } => {
                if let Some(rs) = room {
                    rs.remove_slot(*id);
                }
                if let Some(bs) = booking {
                    bs.cancelled = true;
                    for attendee_id in &bs.roster {
                        self.unindex_registration(attendee_id, id);
                    }
                }
                self.bookings.remove(id);
            }
            Event::AttendeeRegistered { booking_id, attendee_id } => {
                let Some(bs) = booking else { return };
                if !bs.is_registered(attendee_id) {
                    bs.roster.push(*attendee_id);
                }
                self.attendee_bookings
                    .entry(*attendee_id)
                    .or_default()
                    .insert(*booking_id);
            }
            Event::AttendeeDeregistered { booking_id, attendee_id } => {
                let Some(bs) = booking else { return };
                bs.roster.retain(|a| a != attendee_id);
                self.unindex_registration(attendee_id, booking_id);
            }
            Event::OrganiserDeleted { id } => {
                if let Some((_, o)) = self.organisers.remove(id) {
                    self.usernames.remove_if(&o.username, |_, owner| owner == id);
                }
            }
            Event::AttendeeDeleted { id } => {
                if let Some((_, a)) = self.attendees.remove(id) {
                    self.usernames.remove_if(&a.username, |_, owner| owner == id);
                }
                self.attendee_bookings.remove(id);
            }
        }
    }

    fn unindex_registration(&self, attendee_id: &Ulid, booking_id: &Ulid) {
        if let Some(mut set) = self.attendee_bookings.get_mut(attendee_id) {
            set.remove(booking_id);
        }
        self.attendee_bookings.remove_if(attendee_id, |_, set| set.is_empty());
    }

    /// Durably append one event via the group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event: event.clone(), response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply. Memory is untouched if the append fails.
    async fn persist_and_apply(
        &self,
        event: &Event,
        room: Option<&mut RoomState>,
        booking: Option<&mut BookingState>,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply(event, room, booking);
        Ok(())
    }

    /// Run a mutation under the shared commit gate and record its outcome.
    async fn commit<T>(
        &self,
        op: &'static str,
        mutation: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let started = Instant::now();
        let result = {
            let _gate = self.commit_gate.read().await;
            mutation.await
        };
        finish(op, started, result)
    }

    /// Like `commit`, but with the gate held exclusively: no other mutation
    /// is in flight while `mutation` checks and writes.
    async fn commit_exclusive<T>(
        &self,
        op: &'static str,
        mutation: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let started = Instant::now();
        let result = {
            let _gate = self.commit_gate.write().await;
            mutation.await
        };
        finish(op, started, result)
    }

    pub(super) fn get_room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub(super) fn get_booking_state(&self, id: &Ulid) -> Option<SharedBookingState> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty() && self.organisers.is_empty() && self.attendees.is_empty()
    }
}

fn finish<T>(
    op: &'static str,
    started: Instant,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    if let Err(e) = &result {
        tracing::debug!("{op} rejected: {e}");
    }
    observability::record_outcome(op, started, &result);
    result
}

fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomAvailabilitySet { id, .. } | Event::RoomDeleted { id } => Some(*id),
        Event::BookingCreated { room_id, .. } | Event::BookingCancelled { room_id, .. } => {
            Some(*room_id)
        }
        _ => None,
    }
}

fn event_booking_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCancelled { id, .. } => Some(*id),
        Event::AttendeeRegistered { booking_id, .. }
        | Event::AttendeeDeregistered { booking_id, .. } => Some(*booking_id),
        _ => None,
    }
}
