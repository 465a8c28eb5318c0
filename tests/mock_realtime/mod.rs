//! Mock realtime backend
//!
//! A WebSocket server speaking the realtime event protocol. It answers
//! `session.update` with `session.updated`, records every client event it
//! receives and lets the test push arbitrary server events.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockRealtime {
    /// Base URL to configure as `realtime_url`
    pub url: String,
    /// Client events received, in order
    pub received: mpsc::UnboundedReceiver<Value>,
    /// Server events to send to the connected client
    pub push: mpsc::UnboundedSender<Value>,
}

impl MockRealtime {
    /// Listen on an ephemeral port and serve the first connection.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut write, mut read) = ws.split();

            let created = json!({"type": "session.created", "session": {"id": "sess_mock"}});
            if write
                .send(Message::Text(created.to_string().into()))
                .await
                .is_err()
            {
                return;
            }

            loop {
                select! {
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let event: Value = serde_json::from_str(&text).unwrap();
                            if event["type"] == "session.update" {
                                let reply = json!({
                                    "type": "session.updated",
                                    "session": {"id": "sess_mock"}
                                });
                                if write.send(Message::Text(reply.to_string().into())).await.is_err() {
                                    break;
                                }
                            }
                            let _ = received_tx.send(event);
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    },
                    event = push_rx.recv() => match event {
                        Some(event) => {
                            if write.send(Message::Text(event.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            url: format!("ws://{addr}/v1/realtime"),
            received,
            push,
        }
    }

    /// Next client event of the given type, discarding others.
    pub async fn expect_event(&mut self, event_type: &str) -> Value {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.received.recv())
                .await
                .expect("timed out waiting for client event")
                .expect("mock backend stopped");
            if event["type"] == event_type {
                return event;
            }
        }
    }

    /// Next client event that is not an audio append.
    pub async fn next_control_event(&mut self) -> Value {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.received.recv())
                .await
                .expect("timed out waiting for client event")
                .expect("mock backend stopped");
            if event["type"] != "input_audio_buffer.append" {
                return event;
            }
        }
    }

    pub fn send(&self, event: Value) {
        self.push.send(event).unwrap();
    }
}
