//! OpenAI Realtime API WebSocket connector.
//!
//! Each [`OpenAIRealtimeConnector::connect`] call opens one WebSocket and
//! spawns a pump task that serializes outgoing [`ClientEvent`]s and parses
//! incoming frames into [`ServerEvent`]s. The pump ends when either side
//! closes, after which a single [`BackendEvent::Closed`] is delivered.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, error, info, warn};

use super::messages::{ClientEvent, ServerEvent};
use crate::core::realtime::base::{
    BackendConnector, BackendEvent, BackendLink, RealtimeConfig, RealtimeError, RealtimeResult,
};

/// Channel capacity for WebSocket messages in each direction.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Connector for the OpenAI Realtime API.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAIRealtimeConnector;

impl OpenAIRealtimeConnector {
    pub fn new() -> Self {
        Self
    }

    fn build_request(
        config: &RealtimeConfig,
    ) -> RealtimeResult<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let url = config.ws_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid URL {url}: {e}")))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| RealtimeError::AuthenticationFailed(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        Ok(request)
    }
}

#[async_trait]
impl BackendConnector for OpenAIRealtimeConnector {
    async fn connect(&self, config: &RealtimeConfig) -> RealtimeResult<BackendLink> {
        config.validate()?;
        let request = Self::build_request(config)?;

        let (ws_stream, _response) =
            tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    RealtimeError::Timeout(format!(
                        "connect to {} after {:?}",
                        config.url, config.connect_timeout
                    ))
                })?
                .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        info!(model = %config.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<BackendEvent>(WS_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let reason: Option<String> = loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        let Some(event) = outgoing else {
                            // Bridge dropped its sender; close politely.
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break None;
                        };
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                error!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            error!("Failed to send WebSocket message: {}", e);
                            break Some(e.to_string());
                        }
                    }

                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerEvent>(&text) {
                                    Ok(event) => {
                                        if in_tx.send(BackendEvent::Server(event)).await.is_err() {
                                            debug!("Bridge receiver dropped, stopping backend pump");
                                            let _ = ws_sink.send(Message::Close(None)).await;
                                            break None;
                                        }
                                    }
                                    Err(e) => {
                                        debug!("Skipping unparseable server event: {}", e);
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    warn!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                info!("Backend WebSocket closed by server");
                                break frame.map(|f| f.reason.to_string());
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("Backend WebSocket error: {}", e);
                                break Some(e.to_string());
                            }
                            None => break None,
                        }
                    }
                }
            };

            let _ = in_tx.send(BackendEvent::Closed { reason }).await;
        });

        Ok(BackendLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// =============================================================================
// Tests
// =============================================================================
