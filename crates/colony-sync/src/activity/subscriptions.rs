//! Per-room channel subscriptions owned by the activity engine.

use std::collections::{BTreeMap, BTreeSet};

use colony_types::{Message, RoomId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::channels::{ChannelMux, RUNS_CHANNEL, Subscription, room_channel};

/// Keeps one subscription per tracked room plus one on the shared runs
/// channel. Every handler forwards into the same queue, which preserves the
/// order the transport delivered messages in.
#[derive(Debug)]
pub struct RoomSubscriptions {
    mux: ChannelMux,
    forward: mpsc::UnboundedSender<Message>,
    shared: Option<Subscription>,
    rooms: BTreeMap<RoomId, Subscription>,
}

impl RoomSubscriptions {
    /// Subscribe to the runs channel and start with no rooms.
    pub fn new(mux: &ChannelMux, forward: mpsc::UnboundedSender<Message>) -> Self {
        let shared = Some(Self::forwarding(mux, &forward, RUNS_CHANNEL.to_owned()));
        Self {
            mux: mux.clone(),
            forward,
            shared,
            rooms: BTreeMap::new(),
        }
    }

    /// Bring the room subscriptions in line with `wanted`.
    ///
    /// Rooms no longer wanted are unsubscribed, new ones subscribed, the
    /// rest left untouched. Returns `(added, removed)`.
    pub fn reconcile(&mut self, wanted: &BTreeSet<RoomId>) -> (usize, usize) {
        let before = self.rooms.len();
        self.rooms.retain(|room, _| wanted.contains(room));
        let removed = before.saturating_sub(self.rooms.len());

        let mut added = 0_usize;
        for room in wanted {
            if !self.rooms.contains_key(room) {
                let sub = Self::forwarding(&self.mux, &self.forward, room_channel(*room));
                self.rooms.insert(*room, sub);
                added = added.saturating_add(1);
            }
        }
        if added > 0 || removed > 0 {
            debug!(added, removed, tracked = self.rooms.len(), "room subscriptions reconciled");
        }
        (added, removed)
    }

    /// Rooms currently subscribed, ascending.
    pub fn rooms(&self) -> impl Iterator<Item = RoomId> + '_ {
        self.rooms.keys().copied()
    }

    /// Drop every subscription, the runs channel included.
    pub fn clear(&mut self) {
        self.rooms.clear();
        self.shared = None;
    }

    fn forwarding(
        mux: &ChannelMux,
        forward: &mpsc::UnboundedSender<Message>,
        channel: String,
    ) -> Subscription {
        let tx = forward.clone();
        mux.subscribe(channel, move |message| {
            // The engine is gone once the receiver closes; nothing to do.
            let _ = tx.send(message.clone());
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn set(ids: &[u64]) -> BTreeSet<RoomId> {
        ids.iter().copied().map(RoomId::new).collect()
    }

    #[test]
    fn runs_channel_is_subscribed_from_the_start() {
        let mux = ChannelMux::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let _subs = RoomSubscriptions::new(&mux, tx);
        assert_eq!(mux.subscriber_count(RUNS_CHANNEL), 1);
        assert_eq!(mux.channel_count(), 1);
    }

    #[test]
    fn reconcile_applies_the_symmetric_difference() {
        let mux = ChannelMux::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut subs = RoomSubscriptions::new(&mux, tx);

        assert_eq!(subs.reconcile(&set(&[1, 2])), (2, 0));
        assert_eq!(subs.reconcile(&set(&[2, 3])), (1, 1));
        assert_eq!(subs.reconcile(&set(&[2, 3])), (0, 0));

        assert_eq!(subs.rooms().collect::<Vec<_>>(), vec![RoomId::new(2), RoomId::new(3)]);
        assert_eq!(mux.subscriber_count("room:1"), 0);
        assert_eq!(mux.subscriber_count("room:2"), 1);
        assert_eq!(mux.subscriber_count("room:3"), 1);
    }

    #[test]
    fn churn_never_leaks_handlers() {
        let mux = ChannelMux::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut subs = RoomSubscriptions::new(&mux, tx);
        for round in 0..10_u64 {
            subs.reconcile(&set(&[round, round.saturating_add(1), 99]));
        }
        subs.reconcile(&set(&[]));
        assert_eq!(mux.channel_count(), 1);

        subs.clear();
        assert_eq!(mux.channel_count(), 0);
    }

    #[tokio::test]
    async fn messages_are_forwarded_in_order() {
        let mux = ChannelMux::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subs = RoomSubscriptions::new(&mux, tx);
        subs.reconcile(&set(&[7]));

        for kind in ["vote:cast", "decision:resolved"] {
            mux.dispatch(&Message::new("room:7", kind, serde_json::Value::Null));
        }
        mux.dispatch(&Message::new("room:8", "vote:cast", serde_json::Value::Null));
        mux.dispatch(&Message::new(RUNS_CHANNEL, "run:started", serde_json::Value::Null));

        let kinds: Vec<String> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|m| m.kind)
        .collect();
        assert_eq!(kinds, vec!["vote:cast", "decision:resolved", "run:started"]);
        assert!(rx.try_recv().is_err());
    }
}
