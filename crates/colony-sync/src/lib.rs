//! Live data synchronization core for the Colony console.
//!
//! Three cooperating pieces keep the dashboard's view of a remote swarm
//! fresh:
//!
//! - [`poll`] -- an adaptive polling scheduler with exponential backoff
//!   and at most one request in flight
//! - [`channels`] -- a publish/subscribe multiplexer that fans transport
//!   messages out to per-channel handlers
//! - [`activity`] -- the event derivation engine, which diffs polled
//!   worker snapshots and maps push messages into an expiring feed
//!
//! Each scheduler and the activity engine run as their own Tokio task and
//! are driven through a handle; the multiplexer registry is the only state
//! shared between tasks.

pub mod activity;
pub mod channels;
pub mod poll;

pub use activity::{
    ActivityConfig, ActivityEngine, ActivityFeed, ActivityHandle, EventDraft, EventSource,
    Simulator, SnapshotDiffer, UnscopedRunPolicy,
};
pub use channels::{ChannelMux, Handler, RUNS_CHANNEL, Subscription, room_channel};
pub use poll::{Backoff, FetchError, PollConfig, PollHandle, PollState, Producer, producer};
