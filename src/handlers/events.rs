//! Per-call event stream over WebSocket

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::select;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::core::call::CallEvent;
use crate::errors::app_error::AppError;
use crate::state::AppState;

/// `GET /calls/{call_sid}/events`
///
/// Streams the JSON [`CallEvent`]s of one live call until it ends or the
/// client disconnects.
pub async fn call_events_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Response {
    if state.tracker.get(&call_sid).is_none() {
        return AppError::CallNotFound(call_sid).into_response();
    }
    // Subscribe before upgrading so nothing published in between is missed.
    let events = state.tracker.events().subscribe();
    ws.on_upgrade(move |socket| stream_call_events(socket, events, call_sid))
}

async fn stream_call_events(
    socket: WebSocket,
    mut events: broadcast::Receiver<CallEvent>,
    call_sid: String,
) {
    info!(call_sid = %call_sid, "Event stream subscriber connected");
    let (mut sender, mut receiver) = socket.split();

    loop {
        select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if event.call_sid() != Some(call_sid.as_str()) {
                        continue;
                    }
                    let ended = matches!(event, CallEvent::SessionEnd { .. });
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize call event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                    if ended {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(call_sid = %call_sid, skipped, "Event stream subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => debug!("Ignoring message on event stream"),
            },
        }
    }

    info!(call_sid = %call_sid, "Event stream subscriber disconnected");
}
