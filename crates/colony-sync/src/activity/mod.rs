//! Event derivation: turns worker snapshots and push messages into a
//! bounded, self-expiring activity feed.
//!
//! - [`feed`] -- the expiring event and ripple buffers
//! - [`diff`] -- worker snapshot diffing
//! - [`mapping`] -- push message to event mapping
//! - [`simulation`] -- synthetic activity for demos
//! - [`subscriptions`] -- per-room channel subscriptions
//! - [`engine`] -- the actor tying it all together

pub mod config;
pub mod diff;
pub mod engine;
pub mod feed;
pub mod mapping;
pub mod simulation;
pub mod subscriptions;

pub use config::ActivityConfig;
pub use diff::SnapshotDiffer;
pub use engine::{ActivityEngine, ActivityHandle};
pub use feed::{ActivityFeed, EventDraft};
pub use mapping::{UnscopedRunPolicy, kind_for, map_message};
pub use simulation::{EventSource, Simulator};
pub use subscriptions::RoomSubscriptions;
