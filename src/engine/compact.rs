use tokio::sync::oneshot;

use crate::model::*;

use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Minimal event sequence that recreates the current state.
    async fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();

        for o in self.list_organisers() {
            events.push(Event::OrganiserCreated { id: o.id, name: o.name, username: o.username });
        }
        for a in self.list_attendees() {
            events.push(Event::AttendeeCreated { id: a.id, name: a.name, username: a.username });
        }
        for room in self.list_rooms().await {
            events.push(Event::RoomCreated {
                id: room.id,
                name: room.name,
                capacity: room.capacity,
            });
            if !room.available {
                events.push(Event::RoomAvailabilitySet { id: room.id, available: false });
            }
        }
        for info in self.list_bookings().await {
            let b = info.booking;
            events.push(Event::BookingCreated {
                id: b.id,
                room_id: b.room_id,
                organiser_id: b.organiser_id,
                event_name: b.event_name,
                start: b.start,
                duration_minutes: b.duration_minutes,
            });
            // Roster order is registration order.
            for attendee_id in info.attendees {
                events.push(Event::AttendeeRegistered { booking_id: b.id, attendee_id });
            }
        }
        events
    }

    /// Rewrite the WAL to the minimal event set for the current state.
    ///
    /// Holds the commit gate exclusively so no mutation lands between the
    /// snapshot and the file swap.
    pub async fn compact_wal(&self) -> Result<usize, EngineError> {
        let _gate = self.commit_gate.write().await;
        let events = self.snapshot_events().await;
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("wal compacted to {count} events");
        Ok(count)
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
