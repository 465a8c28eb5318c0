//! In-memory backend for unit tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    BackendConnector, BackendEvent, BackendLink, ClientEvent, RealtimeConfig, RealtimeError,
    RealtimeResult,
};

/// The backend end of one connected session.
pub(crate) struct BackendPeer {
    pub from_bridge: mpsc::Receiver<ClientEvent>,
    pub to_bridge: mpsc::Sender<BackendEvent>,
}

/// Connector whose sessions are plain channels handed to the test.
pub(crate) struct ChannelConnector {
    peers: mpsc::UnboundedSender<BackendPeer>,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BackendPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers }, rx)
    }
}

#[async_trait]
impl BackendConnector for ChannelConnector {
    async fn connect(&self, _config: &RealtimeConfig) -> RealtimeResult<BackendLink> {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        self.peers
            .send(BackendPeer {
                from_bridge: out_rx,
                to_bridge: in_tx,
            })
            .map_err(|_| RealtimeError::NotConnected)?;
        Ok(BackendLink {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// [`ChannelConnector`] that waits before every connect.
pub(crate) struct DelayedConnector {
    inner: ChannelConnector,
    delay: Duration,
}

impl DelayedConnector {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<BackendPeer>) {
        let (inner, rx) = ChannelConnector::new();
        (Self { inner, delay }, rx)
    }
}

#[async_trait]
impl BackendConnector for DelayedConnector {
    async fn connect(&self, config: &RealtimeConfig) -> RealtimeResult<BackendLink> {
        tokio::time::sleep(self.delay).await;
        self.inner.connect(config).await
    }

    fn name(&self) -> &'static str {
        "delayed"
    }
}

/// Connector that always fails.
pub(crate) struct RefusingConnector;

#[async_trait]
impl BackendConnector for RefusingConnector {
    async fn connect(&self, _config: &RealtimeConfig) -> RealtimeResult<BackendLink> {
        Err(RealtimeError::ConnectionFailed("refused".into()))
    }

    fn name(&self) -> &'static str {
        "refusing"
    }
}
