//! Observer API server for the Colony console.
//!
//! Exposes the activity engine's read-only view to the rendering layer:
//!
//! - **`WebSocket` endpoint** (`/ws/activity`) pushing the full
//!   [`ActivityView`](colony_types::ActivityView) on every change
//! - **REST endpoints** for the current view and poller health
//! - **Minimal HTML status page** (`GET /`)
//!
//! Handlers read from a [`tokio::sync::watch`] receiver, so serving a
//! request never blocks the engine and never hands out mutable access to
//! the feed.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_observer};
pub use state::{AppState, SyncStatus};
