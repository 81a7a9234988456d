//! The activity engine actor.
//!
//! One task owns the feed, the snapshot differ, the known rooms and the
//! room subscriptions. It reacts to four things: room and worker updates
//! sent through its [`ActivityHandle`], push messages forwarded by its
//! subscriptions, the expiry sweep, and (in simulation) its own timer.
//! Simulated events are added on top of the live ones; the live sources
//! run either way. Every change to the feed is published as a fresh
//! [`ActivityView`].

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use colony_types::{ActivityView, Message, Room, RoomId, Worker};
use futures::future::OptionFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::config::ActivityConfig;
use super::diff::SnapshotDiffer;
use super::feed::{ActivityFeed, EventDraft};
use super::mapping::map_message;
use super::simulation::{EventSource, Simulator};
use super::subscriptions::RoomSubscriptions;
use crate::channels::ChannelMux;

/// Shortest sweep period accepted; guards against a zero interval.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

enum Input {
    Rooms(Vec<Room>),
    Workers(Vec<Worker>),
    Shutdown,
}

/// Handle to a running activity engine.
///
/// Dropping the handle aborts the engine, which releases its channel
/// subscriptions.
pub struct ActivityHandle {
    inputs: mpsc::UnboundedSender<Input>,
    view: watch::Receiver<ActivityView>,
    task: Option<JoinHandle<()>>,
}

impl ActivityHandle {
    /// Replace the known room set. Active rooms are tracked.
    pub fn update_rooms(&self, rooms: Vec<Room>) {
        self.send(Input::Rooms(rooms));
    }

    /// Feed a freshly polled worker snapshot to the differ.
    pub fn observe_workers(&self, workers: Vec<Worker>) {
        self.send(Input::Workers(workers));
    }

    /// Receiver notified whenever the feed changes.
    pub fn view(&self) -> watch::Receiver<ActivityView> {
        self.view.clone()
    }

    /// Clone of the current view.
    pub fn snapshot(&self) -> ActivityView {
        self.view.borrow().clone()
    }

    /// Stop the engine, release its subscriptions and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.send(Input::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "activity engine ended abnormally");
            }
        }
    }

    fn send(&self, input: Input) {
        if self.inputs.send(input).is_err() {
            debug!("activity engine already stopped, input ignored");
        }
    }
}

impl Drop for ActivityHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ActivityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityHandle")
            .field("running", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

/// State owned by the engine task.
pub struct ActivityEngine {
    config: ActivityConfig,
    feed: ActivityFeed,
    differ: SnapshotDiffer,
    rooms: Vec<Room>,
    subscriptions: RoomSubscriptions,
    simulator: Option<Box<Simulator>>,
    clock: FeedClock,
    view: watch::Sender<ActivityView>,
}

impl ActivityEngine {
    /// Spawn an engine on the current Tokio runtime.
    ///
    /// The engine subscribes to the shared runs channel right away and to
    /// room channels as rooms become active. A simulated source adds a
    /// timer of synthetic events to those live sources.
    pub fn spawn(mux: &ChannelMux, config: &ActivityConfig, source: EventSource) -> ActivityHandle {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ActivityView::default());

        let subscriptions = RoomSubscriptions::new(mux, message_tx);
        let simulator = match source {
            EventSource::Live => None,
            EventSource::Simulated(sim) => Some(sim),
        };
        info!(
            simulated = simulator.is_some(),
            capacity = config.capacity,
            event_ttl_ms = config.event_ttl_ms,
            "starting activity engine"
        );

        let engine = Self {
            config: config.clone(),
            feed: ActivityFeed::new(config),
            differ: SnapshotDiffer::new(),
            rooms: Vec::new(),
            subscriptions,
            simulator,
            clock: FeedClock::start(),
            view: view_tx,
        };
        let task = tokio::spawn(engine.run(input_rx, message_rx));

        ActivityHandle {
            inputs: input_tx,
            view: view_rx,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<Input>,
        mut messages: mpsc::UnboundedReceiver<Message>,
    ) {
        let period = self.config.sweep_interval().max(MIN_SWEEP_INTERVAL);
        let mut sweep = tokio::time::interval_at(after(period), period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut simulate_at = self.next_simulation_deadline();

        loop {
            tokio::select! {
                biased;

                input = inputs.recv() => match input {
                    None | Some(Input::Shutdown) => break,
                    Some(Input::Rooms(rooms)) => self.set_rooms(rooms),
                    Some(Input::Workers(workers)) => self.observe_workers(&workers),
                },

                Some(message) = messages.recv() => self.on_message(&message),

                _ = sweep.tick() => {
                    if self.feed.sweep(self.clock.now()) {
                        self.publish();
                    }
                }

                Some(()) = OptionFuture::from(simulate_at.map(tokio::time::sleep_until)) => {
                    self.simulate();
                    simulate_at = self.next_simulation_deadline();
                }
            }
        }

        self.subscriptions.clear();
        debug!(events = self.feed.event_count(), "activity engine stopped");
    }

    fn set_rooms(&mut self, rooms: Vec<Room>) {
        self.rooms = rooms;
        let tracked = self.tracked_rooms();
        self.subscriptions.reconcile(&tracked);
    }

    fn observe_workers(&mut self, workers: &[Worker]) {
        let drafts = self.differ.observe(workers);
        if !drafts.is_empty() {
            trace!(count = drafts.len(), "worker transitions");
            self.emit(drafts);
        }
    }

    fn on_message(&mut self, message: &Message) {
        match map_message(message, &self.rooms, self.config.unscoped_runs) {
            Some(draft) => self.emit(vec![draft]),
            None => trace!(channel = %message.channel, kind = %message.kind, "message produced no event"),
        }
    }

    fn simulate(&mut self) {
        let rooms: Vec<RoomId> = self.tracked_rooms().into_iter().collect();
        let drafts = match self.simulator.as_mut() {
            Some(simulator) => simulator.next_batch(&rooms),
            None => return,
        };
        if !drafts.is_empty() {
            self.emit(drafts);
        }
    }

    fn next_simulation_deadline(&mut self) -> Option<Instant> {
        let delay = self.simulator.as_mut()?.next_delay();
        Some(after(delay))
    }

    fn emit(&mut self, drafts: Vec<EventDraft>) {
        let now = self.clock.now();
        for draft in drafts {
            let id = self.feed.push(draft, now);
            trace!(event = %id, "event emitted");
        }
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(self.feed.view());
    }

    fn tracked_rooms(&self) -> BTreeSet<RoomId> {
        self.rooms
            .iter()
            .filter(|room| room.is_active())
            .map(|room| room.id)
            .collect()
    }
}

/// Wall-clock time advanced by the runtime's monotonic clock.
///
/// Anchored once at spawn, so expiry stamps and sweeps follow Tokio time,
/// paused time included.
#[derive(Debug, Clone, Copy)]
struct FeedClock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
}

impl FeedClock {
    fn start() -> Self {
        Self {
            origin: Instant::now(),
            origin_utc: Utc::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::MAX);
        self.origin_utc
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or(now)
}
