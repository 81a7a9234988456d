//! Synthetic activity for demos.
//!
//! A [`Simulator`] adds a fixed catalog of plausible events to the live
//! push and diff sources, scattered over the tracked rooms at random
//! intervals.

use std::time::Duration;

use colony_types::{ActivityKind, RoomId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::feed::EventDraft;

/// Shortest gap between simulated batches in milliseconds.
const MIN_DELAY_MS: u64 = 800;

/// Longest gap between simulated batches in milliseconds.
const MAX_DELAY_MS: u64 = 2_000;

/// Probability of a second, near-simultaneous event in a batch.
const BURST_PROBABILITY: f64 = 0.3;

/// The catalog cycled by the simulator.
pub const SAMPLE_EVENTS: &[(ActivityKind, &str)] = &[
    (ActivityKind::WorkerThinking, "Scout is thinking"),
    (ActivityKind::TaskStarted, "Task started: market scan"),
    (ActivityKind::MessageSent, "Queen: status report please"),
    (ActivityKind::WorkerActing, "Builder is acting"),
    (ActivityKind::DecisionProposed, "Proposed: hire a researcher"),
    (ActivityKind::VoteCast, "Scout voted yes"),
    (ActivityKind::WorkerVoting, "Builder is voting"),
    (ActivityKind::DecisionResolved, "Decision approved"),
    (ActivityKind::TaskCompleted, "Task completed: market scan"),
    (ActivityKind::SkillCreated, "New skill: summarize filings"),
    (ActivityKind::GoalUpdated, "Goal: ship the landing page"),
    (ActivityKind::WalletTransfer, "Transferred 25"),
    (ActivityKind::WorkerRateLimited, "Analyst hit a rate limit"),
    (ActivityKind::TaskFailed, "Task failed: scrape pricing"),
    (ActivityKind::EscalationRaised, "Escalation: need API key"),
    (ActivityKind::WorkerBlocked, "Analyst is blocked"),
];

/// Random generator of synthetic activity.
#[derive(Debug, Clone)]
pub struct Simulator {
    rng: StdRng,
    cursor: usize,
}

impl Simulator {
    /// Simulator with a fixed seed, for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Simulator seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    const fn with_rng(rng: StdRng) -> Self {
        Self { rng, cursor: 0 }
    }

    /// Delay until the next batch, uniform over 800..=2000 ms.
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.random_range(MIN_DELAY_MS..=MAX_DELAY_MS))
    }

    /// Produce the next batch of one or two events over `rooms`.
    ///
    /// Returns nothing when no rooms are tracked.
    pub fn next_batch(&mut self, rooms: &[RoomId]) -> Vec<EventDraft> {
        if rooms.is_empty() {
            return Vec::new();
        }
        let count = if self.rng.random_bool(BURST_PROBABILITY) {
            2
        } else {
            1
        };
        (0..count).filter_map(|_| self.next_event(rooms)).collect()
    }

    fn next_event(&mut self, rooms: &[RoomId]) -> Option<EventDraft> {
        let (kind, label) = SAMPLE_EVENTS.get(self.cursor)?;
        self.cursor = self
            .cursor
            .wrapping_add(1)
            .checked_rem(SAMPLE_EVENTS.len())
            .unwrap_or(0);
        let room = rooms.get(self.rng.random_range(0..rooms.len()))?;
        Some(EventDraft::new(*kind, *room, *label))
    }
}

/// Where the engine's events come from. Chosen once when it is spawned.
#[derive(Debug, Clone)]
pub enum EventSource {
    /// Push messages and worker snapshot diffs.
    Live,
    /// The live sources plus synthetic events.
    Simulated(Box<Simulator>),
}

impl EventSource {
    /// `Simulated` (seeded from the OS) when `simulate` is set, else `Live`.
    pub fn from_flag(simulate: bool) -> Self {
        if simulate {
            Self::Simulated(Box::new(Simulator::from_os_rng()))
        } else {
            Self::Live
        }
    }

    /// Whether this is the simulated source.
    pub const fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }
}
