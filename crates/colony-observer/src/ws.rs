//! `WebSocket` handler streaming the activity view.
//!
//! Clients connect to `GET /ws/activity`, receive the current view at once
//! and then a JSON-encoded [`ActivityView`] every time the engine publishes
//! a change. Intermediate views a slow client misses are skipped; it always
//! resumes from the latest.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use colony_types::ActivityView;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming activity views.
///
/// # Route
///
/// `GET /ws/activity`
pub async fn ws_activity(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Send `view` as a text frame. Returns `false` once the client is gone.
async fn send_view(socket: &mut WebSocket, view: &ActivityView) -> bool {
    let json = match serde_json::to_string(view) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize activity view: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    let mut rx = state.subscribe();
    let initial = rx.borrow_and_update().clone();
    if !send_view(&mut socket, &initial).await {
        debug!("WebSocket client disconnected (send failed)");
        return;
    }

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("Activity engine stopped, closing WebSocket");
                    return;
                }
                let view = rx.borrow_and_update().clone();
                if !send_view(&mut socket, &view).await {
                    debug!("WebSocket client disconnected (send failed)");
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
