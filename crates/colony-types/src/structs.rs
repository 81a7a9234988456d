//! Core record types: resource snapshots, push messages and activity items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ActivityKind, RoomStatus, WorkerState};
use crate::ids::{EventId, RoomId, WorkerId};

/// A room as returned by the resource API's room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Lifecycle status.
    pub status: RoomStatus,
}

impl Room {
    /// Whether the room's queen is currently running.
    pub fn is_active(&self) -> bool {
        self.status == RoomStatus::Active
    }
}

/// A worker record from one polled snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Worker identifier, stable across snapshots.
    pub id: WorkerId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// The room the worker belongs to, if it is assigned to one.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Current observable state.
    pub state: WorkerState,
}

/// A push notification delivered by the transport.
///
/// The payload is opaque to the multiplexer; only the activity mapper
/// interprets `kind` and `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Message {
    /// Channel the message was published on, e.g. `room:7`.
    pub channel: String,
    /// Message type, e.g. `vote:cast`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Message {
    /// Build a message from its parts.
    pub fn new(
        channel: impl Into<String>,
        kind: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            channel: channel.into(),
            kind: kind.into(),
            data,
        }
    }
}

/// An ephemeral activity event shown on the swarm view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SwarmEvent {
    /// Unique event id.
    pub id: EventId,
    /// What happened.
    pub kind: ActivityKind,
    /// The room the event is attributed to.
    pub room_id: RoomId,
    /// Short human-readable description.
    pub label: String,
    /// Instant after which the event is evicted.
    pub expires_at: DateTime<Utc>,
}

/// A short-lived visual pulse emitted alongside every [`SwarmEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct SwarmRipple {
    /// Same id as the event that produced the ripple.
    pub id: EventId,
    /// The room the ripple is drawn on.
    pub room_id: RoomId,
    /// CSS color of the pulse.
    pub color: String,
    /// Instant after which the ripple is evicted.
    pub expires_at: DateTime<Utc>,
}

/// Read-only view of the activity feed handed to the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActivityView {
    /// Live events, oldest first.
    pub events: Vec<SwarmEvent>,
    /// Live ripples, oldest first.
    pub ripples: Vec<SwarmRipple>,
}

impl ActivityView {
    /// Whether both collections are empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.ripples.is_empty()
    }
}
