//! REST endpoint handlers for the observer server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/activity` | Current activity view (`?room=N` filters) |
//! | `GET` | `/api/health` | Poller status and feed counts |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use colony_types::{ActivityView, RoomId};

use crate::error::ObserverError;
use crate::state::AppState;

/// Query parameters for `GET /api/activity`.
#[derive(Debug, serde::Deserialize)]
pub struct ActivityQuery {
    /// Only return events and ripples for this room.
    pub room: Option<String>,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page with live counts and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = state.current_view();
    let status = state.status.read().await.clone();
    let events = view.events.len();
    let ripples = view.ripples.len();
    let mode = if status.simulated { "SIMULATED" } else { "LIVE" };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Colony Observer</title>
    <style>
        body {{ background: #0d1117; color: #c9d1d9; font-family: monospace; padding: 2rem; }}
        h1 {{ color: #58a6ff; }}
        .metric {{ display: inline-block; border: 1px solid #30363d; padding: 1rem; margin: 0.5rem; }}
        a {{ color: #58a6ff; }}
    </style>
</head>
<body>
    <h1>Colony Observer</h1>
    <p>Mode: {mode}</p>
    <div class="metric">Rooms: {rooms}</div>
    <div class="metric">Tracked: {tracked}</div>
    <div class="metric">Workers: {workers}</div>
    <div class="metric">Events: {events}</div>
    <div class="metric">Ripples: {ripples}</div>
    <ul>
        <li><a href="/api/activity">/api/activity</a></li>
        <li><a href="/api/health">/api/health</a></li>
        <li><code>ws://host:port/ws/activity</code></li>
    </ul>
</body>
</html>"#,
        rooms = status.rooms,
        tracked = status.tracked_rooms,
        workers = status.workers,
    ))
}

// ---------------------------------------------------------------------------
// GET /api/activity -- current feed
// ---------------------------------------------------------------------------

/// Return the current activity view, optionally restricted to one room.
pub async fn get_activity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivityQuery>,
) -> Result<Json<ActivityView>, ObserverError> {
    let view = state.current_view();
    let Some(raw) = params.room else {
        return Ok(Json(view));
    };
    let room: RoomId = raw
        .parse()
        .map_err(|e| ObserverError::InvalidQuery(format!("invalid room id {raw:?}: {e}")))?;

    Ok(Json(ActivityView {
        events: view.events.into_iter().filter(|e| e.room_id == room).collect(),
        ripples: view.ripples.into_iter().filter(|r| r.room_id == room).collect(),
    }))
}

// ---------------------------------------------------------------------------
// GET /api/health -- poller status
// ---------------------------------------------------------------------------

/// Report whether the pollers are healthy, with feed and resource counts.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let status = state.status.read().await.clone();
    let view = state.current_view();

    let mut body = serde_json::to_value(&status)?;
    if let Some(fields) = body.as_object_mut() {
        let label = if status.is_degraded() { "degraded" } else { "ok" };
        fields.insert("status".to_owned(), label.into());
        fields.insert("events".to_owned(), view.events.len().into());
        fields.insert("ripples".to_owned(), view.ripples.len().into());
    }
    Ok(Json(body))
}
