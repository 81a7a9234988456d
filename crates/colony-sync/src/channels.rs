//! Publish/subscribe channel multiplexer.
//!
//! One [`ChannelMux`] sits behind a single transport connection and routes
//! every inbound [`Message`] to the handlers registered on its channel.
//! Subscribers receive a [`Subscription`] guard; dropping it or calling
//! [`Subscription::unsubscribe`] removes exactly that handler and nothing
//! else. Channels with no handlers are removed from the registry, so they
//! cost nothing at dispatch time.
//!
//! The multiplexer has no notion of which channels are relevant. Callers
//! own their channel set and reconcile it themselves.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use colony_types::{Message, RoomId};
use tracing::trace;

/// Shared channel carrying task-run notifications for every room.
pub const RUNS_CHANNEL: &str = "runs";

/// Prefix of per-room channel names.
const ROOM_CHANNEL_PREFIX: &str = "room:";

/// Channel name for a room, e.g. `room:7`.
pub fn room_channel(room: RoomId) -> String {
    format!("{ROOM_CHANNEL_PREFIX}{room}")
}

/// Parse the room id out of a per-room channel name.
pub fn parse_room_channel(channel: &str) -> Option<RoomId> {
    channel.strip_prefix(ROOM_CHANNEL_PREFIX)?.parse().ok()
}

/// A message handler registered on a channel.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    channels: HashMap<String, BTreeMap<u64, Handler>>,
}

impl Registry {
    fn remove(&mut self, channel: &str, id: u64) -> bool {
        let Some(handlers) = self.channels.get_mut(channel) else {
            return false;
        };
        let removed = handlers.remove(&id).is_some();
        if handlers.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }
}

/// Routes transport messages to per-channel handler sets.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct ChannelMux {
    registry: Arc<Mutex<Registry>>,
}

impl ChannelMux {
    /// Create an empty multiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` on `channel`.
    ///
    /// Other handlers on the same channel are never affected.
    pub fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let channel = channel.into();
        let id = {
            let mut registry = self.lock();
            let id = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            registry
                .channels
                .entry(channel.clone())
                .or_default()
                .insert(id, Arc::new(handler));
            id
        };
        trace!(channel = %channel, subscription = id, "subscribed");
        Subscription {
            registry: Arc::downgrade(&self.registry),
            channel,
            id,
            active: true,
        }
    }

    /// Deliver `message` to every handler on its channel.
    ///
    /// Handlers run synchronously, in no particular order, after the
    /// registry lock has been released, so a handler may itself subscribe
    /// or unsubscribe. Returns the number of handlers invoked.
    pub fn dispatch(&self, message: &Message) -> usize {
        let handlers: Vec<Handler> = self
            .lock()
            .channels
            .get(&message.channel)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(message);
        }
        trace!(
            channel = %message.channel,
            kind = %message.kind,
            delivered = handlers.len(),
            "dispatched"
        );
        handlers.len()
    }

    /// Number of handlers registered on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().channels.get(channel).map_or(0, BTreeMap::len)
    }

    /// Number of channels with at least one handler.
    pub fn channel_count(&self) -> usize {
        self.lock().channels.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ChannelMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelMux")
            .field("channels", &self.channel_count())
            .finish()
    }
}

/// Guard for one registered handler.
///
/// Unsubscribes on drop. Does not keep the multiplexer alive.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    channel: String,
    id: u64,
    active: bool,
}

impl Subscription {
    /// The channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the handler is still registered through this guard.
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Remove the handler. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            let removed = registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.channel, self.id);
            trace!(channel = %self.channel, subscription = self.id, removed, "unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn msg(channel: &str, kind: &str) -> Message {
        Message::new(channel, kind, serde_json::json!({}))
    }

    fn counter(mux: &ChannelMux, channel: &str) -> (Subscription, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let sub = mux.subscribe(channel, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (sub, count)
    }

    #[test]
    fn room_channel_names_round_trip() {
        assert_eq!(room_channel(RoomId::new(12)), "room:12");
        assert_eq!(parse_room_channel("room:12"), Some(RoomId::new(12)));
        assert_eq!(parse_room_channel(RUNS_CHANNEL), None);
        assert_eq!(parse_room_channel("room:abc"), None);
    }

    #[test]
    fn fan_out_to_every_subscriber_on_the_channel() {
        let mux = ChannelMux::new();
        let (_a, first) = counter(&mux, "room:1");
        let (_b, second) = counter(&mux, "room:1");
        let (_c, other) = counter(&mux, "room:2");

        let delivered = mux.dispatch(&msg("room:1", "vote:cast"));

        assert_eq!(delivered, 2);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_isolated() {
        let mux = ChannelMux::new();
        let (mut a, first) = counter(&mux, "room:1");
        let (_b, second) = counter(&mux, "room:1");

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());

        mux.dispatch(&msg("room:1", "vote:cast"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(mux.subscriber_count("room:1"), 1);
    }

    #[test]
    fn dropping_the_guard_unsubscribes_and_collects_empty_channels() {
        let mux = ChannelMux::new();
        let (sub, _) = counter(&mux, "room:5");
        assert_eq!(mux.channel_count(), 1);
        drop(sub);
        assert_eq!(mux.channel_count(), 0);
        assert_eq!(mux.dispatch(&msg("room:5", "vote:cast")), 0);
    }

    #[test]
    fn subscription_outliving_the_mux_is_harmless() {
        let mux = ChannelMux::new();
        let (mut sub, _) = counter(&mux, "room:1");
        drop(mux);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }

    #[test]
    fn messages_on_one_channel_arrive_in_dispatch_order() {
        let mux = ChannelMux::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _sub = mux.subscribe("room:1", move |m| {
            log.lock().unwrap().push(m.kind.clone());
        });

        for kind in ["a", "b", "c"] {
            mux.dispatch(&msg("room:1", kind));
        }
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn handlers_may_subscribe_during_dispatch() {
        let mux = ChannelMux::new();
        let inner = mux.clone();
        let spawned = Arc::new(Mutex::new(Vec::new()));
        let keep = Arc::clone(&spawned);
        let _sub = mux.subscribe("room:1", move |_| {
            keep.lock().unwrap().push(inner.subscribe("room:2", |_| {}));
        });

        mux.dispatch(&msg("room:1", "room:created"));
        assert_eq!(mux.subscriber_count("room:2"), 1);
    }
}
