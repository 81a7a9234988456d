//! Shared application state for the observer server.
//!
//! [`AppState`] holds the receiving end of the activity engine's view
//! channel plus a small [`SyncStatus`] record that the console keeps up to
//! date from its pollers. Handlers only ever read clones; nothing served
//! here can mutate the feed.

use std::sync::Arc;

use colony_types::ActivityView;
use serde::Serialize;
use tokio::sync::{RwLock, watch};

/// Freshness of the polled resources, reported by `GET /api/health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    /// Rooms in the latest successful room poll.
    pub rooms: usize,
    /// Rooms currently tracked for push messages.
    pub tracked_rooms: usize,
    /// Workers in the latest successful worker poll.
    pub workers: usize,
    /// Last room poll failure, cleared on success.
    pub rooms_error: Option<String>,
    /// Last worker poll failure, cleared on success.
    pub workers_error: Option<String>,
    /// Whether the feed is fed by the simulator.
    pub simulated: bool,
}

impl SyncStatus {
    /// Whether any poller is currently failing.
    pub const fn is_degraded(&self) -> bool {
        self.rooms_error.is_some() || self.workers_error.is_some()
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Latest activity view published by the engine.
    pub activity: watch::Receiver<ActivityView>,
    /// Poller status, written by the console's bridge tasks.
    pub status: Arc<RwLock<SyncStatus>>,
}

impl AppState {
    /// Serve the views published on `activity`.
    pub fn new(activity: watch::Receiver<ActivityView>) -> Self {
        Self {
            activity,
            status: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    /// Clone of the current activity view.
    pub fn current_view(&self) -> ActivityView {
        self.activity.borrow().clone()
    }

    /// A fresh receiver for streaming view changes.
    pub fn subscribe(&self) -> watch::Receiver<ActivityView> {
        self.activity.clone()
    }

    /// Apply `update` to the sync status.
    pub async fn update_status(&self, update: impl FnOnce(&mut SyncStatus)) {
        let mut status = self.status.write().await;
        update(&mut status);
    }
}
