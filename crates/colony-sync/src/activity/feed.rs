//! The pair of self-expiring buffers behind the swarm view.
//!
//! Events live for the event TTL and are additionally capped at a fixed
//! capacity (oldest dropped first on insert). Ripples live for the shorter
//! ripple TTL and rely on expiry alone. Both buffers are swept
//! independently.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use colony_types::{ActivityKind, ActivityView, EventId, RoomId, SwarmEvent, SwarmRipple};

use super::config::ActivityConfig;

/// An accepted event before it is stamped with an id and expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    /// What happened.
    pub kind: ActivityKind,
    /// The room it is attributed to.
    pub room_id: RoomId,
    /// Short description shown on the swarm view.
    pub label: String,
}

impl EventDraft {
    /// Build a draft.
    pub fn new(kind: ActivityKind, room_id: RoomId, label: impl Into<String>) -> Self {
        Self {
            kind,
            room_id,
            label: label.into(),
        }
    }
}

/// Expiring event and ripple buffers.
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    events: VecDeque<SwarmEvent>,
    ripples: VecDeque<SwarmRipple>,
    next_seq: u64,
    event_ttl: TimeDelta,
    ripple_ttl: TimeDelta,
    capacity: usize,
}

impl ActivityFeed {
    /// Create an empty feed.
    pub fn new(config: &ActivityConfig) -> Self {
        Self {
            events: VecDeque::with_capacity(config.capacity.saturating_add(1)),
            ripples: VecDeque::new(),
            next_seq: 0,
            event_ttl: TimeDelta::from_std(config.event_ttl()).unwrap_or(TimeDelta::MAX),
            ripple_ttl: TimeDelta::from_std(config.ripple_ttl()).unwrap_or(TimeDelta::MAX),
            capacity: config.capacity,
        }
    }

    /// Append an event and its ripple, then trim events to capacity.
    pub fn push(&mut self, draft: EventDraft, now: DateTime<Utc>) -> EventId {
        let id = EventId::new(self.next_seq, now.timestamp_millis());
        self.next_seq = self.next_seq.saturating_add(1);

        self.ripples.push_back(SwarmRipple {
            id,
            room_id: draft.room_id,
            color: draft.kind.color().to_owned(),
            expires_at: expiry(now, self.ripple_ttl),
        });
        self.events.push_back(SwarmEvent {
            id,
            kind: draft.kind,
            room_id: draft.room_id,
            label: draft.label,
            expires_at: expiry(now, self.event_ttl),
        });
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        id
    }

    /// Remove every entry with `expires_at <= now` from both buffers.
    ///
    /// Returns `false` when nothing expired.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> bool {
        let before = (self.events.len(), self.ripples.len());
        self.events.retain(|e| e.expires_at > now);
        self.ripples.retain(|r| r.expires_at > now);
        before != (self.events.len(), self.ripples.len())
    }

    /// Live events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &SwarmEvent> {
        self.events.iter()
    }

    /// Live ripples, oldest first.
    pub fn ripples(&self) -> impl Iterator<Item = &SwarmRipple> {
        self.ripples.iter()
    }

    /// Number of live events.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of live ripples.
    pub fn ripple_count(&self) -> usize {
        self.ripples.len()
    }

    /// Copy of both buffers for consumers.
    pub fn view(&self) -> ActivityView {
        ActivityView {
            events: self.events.iter().cloned().collect(),
            ripples: self.ripples.iter().cloned().collect(),
        }
    }
}

fn expiry(now: DateTime<Utc>, ttl: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn ms(n: i64) -> TimeDelta {
        TimeDelta::milliseconds(n)
    }

    fn draft(n: u64) -> EventDraft {
        EventDraft::new(ActivityKind::TaskStarted, RoomId::new(1), format!("event {n}"))
    }

    #[test]
    fn event_survives_until_ttl_then_expires() {
        let mut feed = ActivityFeed::new(&ActivityConfig::default());
        feed.push(draft(0), t0());

        // Only the ripple is gone at T+4999.
        assert!(feed.sweep(t0() + ms(4_999)));
        assert_eq!(feed.event_count(), 1);
        assert_eq!(feed.ripple_count(), 0);

        assert!(feed.sweep(t0() + ms(5_001)));
        assert_eq!(feed.event_count(), 0);
    }

    #[test]
    fn ripples_expire_before_events() {
        let mut feed = ActivityFeed::new(&ActivityConfig::default());
        feed.push(draft(0), t0());
        assert_eq!(feed.ripple_count(), 1);

        assert!(feed.sweep(t0() + ms(1_200)));
        assert_eq!(feed.ripple_count(), 0);
        assert_eq!(feed.event_count(), 1);
    }

    #[test]
    fn capacity_keeps_most_recent_events() {
        let mut feed = ActivityFeed::new(&ActivityConfig::default());
        for n in 0..25 {
            feed.push(draft(n), t0());
        }
        let labels: Vec<&str> = feed.events().map(|e| e.label.as_str()).collect();
        assert_eq!(labels.len(), 20);
        assert_eq!(labels.first(), Some(&"event 5"));
        assert_eq!(labels.last(), Some(&"event 24"));
        // Ripples are not capped.
        assert_eq!(feed.ripple_count(), 25);
    }

    #[test]
    fn ids_are_unique_within_one_millisecond() {
        let mut feed = ActivityFeed::new(&ActivityConfig::default());
        let a = feed.push(draft(0), t0());
        let b = feed.push(draft(1), t0());
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(a.issued_at_ms, b.issued_at_ms);
    }

    #[test]
    fn ripple_shares_event_id_room_and_kind_color() {
        let mut feed = ActivityFeed::new(&ActivityConfig::default());
        let id = feed.push(
            EventDraft::new(ActivityKind::WorkerBlocked, RoomId::new(4), "stuck"),
            t0(),
        );
        let view = feed.view();
        let ripple = view.ripples.first().unwrap();
        assert_eq!(ripple.id, id);
        assert_eq!(ripple.room_id, RoomId::new(4));
        assert_eq!(ripple.color, ActivityKind::WorkerBlocked.color());
        assert_eq!(ripple.expires_at, t0() + ms(1_200));
        assert_eq!(view.events.first().unwrap().expires_at, t0() + ms(5_000));
    }

    #[test]
    fn sweep_of_empty_or_fresh_feed_reports_no_change() {
        let mut feed = ActivityFeed::new(&ActivityConfig::default());
        assert!(!feed.sweep(t0()));
        feed.push(draft(0), t0());
        assert!(!feed.sweep(t0() + ms(10)));
    }
}
