//! Media-stream WebSocket handler

use axum::{
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::session::TelephonyLink;
use crate::core::telephony::{MAX_TELEPHONY_FRAME_SIZE, TelephonyCommand, TelephonyMessage};
use crate::state::AppState;

use super::query::MediaStreamQuery;

/// Channel buffer between the socket tasks and the bridge
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Media-stream WebSocket handler
///
/// Upgrades the carrier's HTTP request and hands the socket to a new bridge.
/// Capacity is enforced by the call limit middleware before this runs.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MediaStreamQuery>,
) -> Response {
    info!(call_type = ?query.call_type(), "Media stream upgrade requested");

    ws.max_frame_size(MAX_TELEPHONY_FRAME_SIZE)
        .max_message_size(MAX_TELEPHONY_FRAME_SIZE)
        .on_upgrade(move |socket| handle_media_socket(socket, state, query))
}

/// Drive one carrier connection until either side hangs up
async fn handle_media_socket(socket: WebSocket, state: Arc<AppState>, query: MediaStreamQuery) {
    let (mut sender, mut receiver) = socket.split();
    let (command_tx, mut command_rx) = mpsc::channel::<TelephonyCommand>(CHANNEL_BUFFER_SIZE);
    let (frame_tx, frame_rx) = mpsc::channel::<TelephonyMessage>(CHANNEL_BUFFER_SIZE);

    let call_type = query.call_type();
    let link = TelephonyLink {
        incoming: frame_rx,
        outgoing: command_tx,
    };
    let (session_key, done) = match state
        .registry
        .create_session(link, call_type, query.into_options())
        .await
    {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to create bridge session");
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "backend unavailable".into(),
                })))
                .await;
            return;
        }
    };
    info!(session_key = %session_key, "Media stream connected");

    // Writer: ends when the bridge drops its telephony handle
    let mut writer = tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let json = match serde_json::to_string(&command) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize telephony frame: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json.into())).await {
                debug!("Telephony socket write failed: {}", e);
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    loop {
        select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<TelephonyMessage>(&text) {
                        Ok(frame) => {
                            if frame_tx.send(frame).await.is_err() {
                                debug!(session_key = %session_key, "Bridge gone, dropping frame");
                                break;
                            }
                        }
                        Err(e) => debug!("Unparseable telephony frame skipped: {}", e),
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Binary telephony frame ignored: {} bytes", data.len());
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(session_key = %session_key, "Telephony socket closed by carrier");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_key = %session_key, "Telephony socket error: {}", e);
                    break;
                }
            },
            _ = &mut writer => {
                debug!(session_key = %session_key, "Bridge finished, closing telephony socket");
                break;
            }
        }
    }

    // Closing the inbound channel ends the bridge if it is still running.
    drop(frame_tx);
    match done.await {
        Ok(Some(outcome)) => info!(
            session_key = %session_key,
            call_sid = ?outcome.call_sid,
            status = %outcome.status,
            turns = outcome.transcript.len(),
            "Media stream terminated"
        ),
        Ok(None) => warn!(session_key = %session_key, "Bridge ended abnormally"),
        Err(e) => error!(session_key = %session_key, "Session supervisor failed: {}", e),
    }
    writer.abort();
}
