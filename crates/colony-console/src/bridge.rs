//! Glue between the pollers, the push channels and the activity engine.
//!
//! Pull to engine: each successful poll (a new generation) hands its
//! snapshot to the engine exactly once. Push to pull: lifecycle messages
//! on shared channels ask the matching poller to fetch early.

use colony_observer::SyncStatus;
use colony_sync::{ChannelMux, PollState, RUNS_CHANNEL, Subscription};
use colony_types::{Room, Worker};
use tokio::sync::mpsc;
use tracing::trace;

/// Shared channel carrying room lifecycle notifications.
pub const ROOMS_CHANNEL: &str = "rooms";

/// A polled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// The room listing.
    Rooms,
    /// The worker listing.
    Workers,
}

/// Subscribe to the shared channels whose messages make a poll stale.
///
/// Task runs change worker states, so run messages refresh workers; room
/// lifecycle messages refresh rooms. The returned guards must be kept
/// alive for as long as the triggers should fire.
pub fn refresh_triggers(
    mux: &ChannelMux,
    refresh: &mpsc::UnboundedSender<Resource>,
) -> Vec<Subscription> {
    [(RUNS_CHANNEL, Resource::Workers), (ROOMS_CHANNEL, Resource::Rooms)]
        .into_iter()
        .map(|(channel, resource)| {
            let tx = refresh.clone();
            mux.subscribe(channel, move |message| {
                trace!(kind = %message.kind, ?resource, "push triggered refresh");
                let _ = tx.send(resource);
            })
        })
        .collect()
}

/// Passes each poll result through once, when its generation is new.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationGate {
    seen: u64,
}

impl GenerationGate {
    /// The data of `state` if it comes from a poll not seen before.
    pub fn fresh<'a, T>(&mut self, state: &'a PollState<T>) -> Option<&'a T> {
        if state.generation <= self.seen {
            return None;
        }
        self.seen = state.generation;
        state.data.as_ref()
    }
}

/// Reflect the room poller's state in the health status.
pub fn record_rooms(status: &mut SyncStatus, state: &PollState<Vec<Room>>) {
    if let Some(rooms) = &state.data {
        status.rooms = rooms.len();
        status.tracked_rooms = rooms.iter().filter(|r| r.is_active()).count();
    }
    status.rooms_error.clone_from(&state.error);
}

/// Reflect the worker poller's state in the health status.
pub fn record_workers(status: &mut SyncStatus, state: &PollState<Vec<Worker>>) {
    if let Some(workers) = &state.data {
        status.workers = workers.len();
    }
    status.workers_error.clone_from(&state.error);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use colony_types::{Message, RoomId, RoomStatus};

    use super::*;

    fn state<T>(data: Option<T>, generation: u64, error: Option<&str>) -> PollState<T> {
        PollState {
            data,
            error: error.map(str::to_owned),
            is_loading: false,
            next_delay: Duration::from_secs(5),
            generation,
            consecutive_failures: u32::from(error.is_some()),
        }
    }

    fn room(id: u64, status: RoomStatus) -> Room {
        Room {
            id: RoomId::new(id),
            name: String::new(),
            status,
        }
    }

    #[test]
    fn gate_passes_each_generation_once() {
        let mut gate = GenerationGate::default();
        assert_eq!(gate.fresh(&state::<u8>(None, 0, None)), None);
        assert_eq!(gate.fresh(&state(Some(1), 1, None)), Some(&1));
        assert_eq!(gate.fresh(&state(Some(1), 1, None)), None);
        // A failed poll keeps the old generation and data.
        assert_eq!(gate.fresh(&state(Some(1), 1, Some("timeout"))), None);
        assert_eq!(gate.fresh(&state(Some(2), 2, None)), Some(&2));
    }

    #[test]
    fn room_status_counts_active_rooms() {
        let mut status = SyncStatus::default();
        let rooms = vec![
            room(1, RoomStatus::Active),
            room(2, RoomStatus::Paused),
            room(3, RoomStatus::Active),
        ];
        record_rooms(&mut status, &state(Some(rooms), 1, None));
        assert_eq!(status.rooms, 3);
        assert_eq!(status.tracked_rooms, 2);
        assert!(!status.is_degraded());

        record_rooms(&mut status, &state(None, 0, Some("connection refused")));
        assert_eq!(status.rooms, 3);
        assert_eq!(status.rooms_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn worker_status_tracks_errors() {
        let mut status = SyncStatus::default();
        record_workers(&mut status, &state(Some(Vec::new()), 1, Some("503")));
        assert_eq!(status.workers, 0);
        assert!(status.is_degraded());
        record_workers(&mut status, &state(Some(Vec::new()), 2, None));
        assert!(!status.is_degraded());
    }

    #[test]
    fn shared_channel_messages_request_refreshes() {
        let mux = ChannelMux::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let triggers = refresh_triggers(&mux, &tx);

        mux.dispatch(&Message::new(RUNS_CHANNEL, "run:completed", serde_json::Value::Null));
        mux.dispatch(&Message::new(ROOMS_CHANNEL, "room:created", serde_json::Value::Null));
        mux.dispatch(&Message::new("room:1", "vote:cast", serde_json::Value::Null));

        assert_eq!(rx.try_recv().unwrap(), Resource::Workers);
        assert_eq!(rx.try_recv().unwrap(), Resource::Rooms);
        assert!(rx.try_recv().is_err());

        drop(triggers);
        assert_eq!(mux.channel_count(), 0);
    }
}
