//! Concurrent directory of live bridges.
//!
//! Each telephony connection gets a [`SessionKey`] when its bridge is
//! created. Once the carrier's `start` frame names the call, the same
//! bridge also becomes reachable by call sid. Both entries are removed by
//! a supervisor task when the bridge's reactor finishes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::bridge::{
    BridgeCommand, BridgeError, BridgeOutcome, BridgeResult, BridgeSettings, ConnectionHandle,
    ProtocolBridge,
};
use crate::core::call::{CallOptions, CallState, CallStatus, CallTracker, CallType};
use crate::core::realtime::BackendConnector;
use crate::core::telephony::{TelephonyCommand, TelephonyMessage};

/// Capacity of each bridge's operator command channel.
const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// Identity of one telephony connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey(Uuid);

impl SessionKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel pair for the telephony side of a new session.
///
/// `incoming` carries parsed carrier frames to the bridge; `outgoing`
/// receives the frames the bridge wants written back.
#[derive(Debug)]
pub struct TelephonyLink {
    pub incoming: mpsc::Receiver<TelephonyMessage>,
    pub outgoing: mpsc::Sender<TelephonyCommand>,
}

/// Cloneable reference to a running bridge.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    session_key: SessionKey,
    control: mpsc::Sender<BridgeCommand>,
}

impl BridgeHandle {
    pub fn session_key(&self) -> SessionKey {
        self.session_key
    }

    pub fn is_running(&self) -> bool {
        !self.control.is_closed()
    }

    /// Deliver a fire-and-forget command. Returns false if the bridge is gone or busy.
    pub fn send(&self, command: BridgeCommand) -> bool {
        match self.control.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                warn!(session_key = %self.session_key, error = %e, "Bridge command dropped");
                false
            }
        }
    }

    pub async fn hold(&self) -> BridgeResult<CallStatus> {
        self.request(|reply| BridgeCommand::Hold { reply }).await
    }

    pub async fn resume(&self) -> BridgeResult<CallStatus> {
        self.request(|reply| BridgeCommand::Resume { reply }).await
    }

    async fn request<F>(&self, make: F) -> BridgeResult<CallStatus>
    where
        F: FnOnce(oneshot::Sender<BridgeResult<CallStatus>>) -> BridgeCommand,
    {
        let (reply, response) = oneshot::channel();
        self.control
            .send(make(reply))
            .await
            .map_err(|_| BridgeError::Closed)?;
        response.await.map_err(|_| BridgeError::Closed)?
    }
}

/// A claimed call slot, released when dropped.
struct SessionSlot {
    registry: Arc<SessionRegistry>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.registry.slots.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Registry of live bridges, keyed by session key and by call sid.
pub struct SessionRegistry {
    connector: Arc<dyn BackendConnector>,
    settings: BridgeSettings,
    tracker: Arc<CallTracker>,
    max_sessions: Option<usize>,
    /// Live bridges plus sessions still connecting to the backend
    slots: AtomicUsize,
    by_key: DashMap<SessionKey, BridgeHandle>,
    by_call_id: DashMap<String, BridgeHandle>,
}

impl SessionRegistry {
    pub fn new(
        connector: Arc<dyn BackendConnector>,
        settings: BridgeSettings,
        tracker: Arc<CallTracker>,
    ) -> Self {
        Self {
            connector,
            settings,
            tracker,
            max_sessions: None,
            slots: AtomicUsize::new(0),
            by_key: DashMap::new(),
            by_call_id: DashMap::new(),
        }
    }

    /// Cap the number of concurrently live bridges.
    pub fn with_max_sessions(mut self, max_sessions: Option<usize>) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn tracker(&self) -> &Arc<CallTracker> {
        &self.tracker
    }

    pub fn session_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.max_sessions
            .is_none_or(|max| self.slots.load(Ordering::Acquire) < max)
    }

    /// Claim a slot before any await so concurrent upgrades cannot overshoot the cap.
    fn reserve_slot(self: &Arc<Self>) -> BridgeResult<SessionSlot> {
        match self.max_sessions {
            Some(max) => {
                self.slots
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .map_err(|_| BridgeError::AtCapacity(max))?;
            }
            None => {
                self.slots.fetch_add(1, Ordering::AcqRel);
            }
        }
        Ok(SessionSlot {
            registry: Arc::clone(self),
        })
    }

    pub fn get_by_session_key(&self, key: SessionKey) -> Option<BridgeHandle> {
        self.by_key.get(&key).map(|h| h.clone())
    }

    /// Connect a backend session, build a bridge and start its reactor.
    ///
    /// The call slot is claimed up front and released on every failure path.
    /// On error nothing is registered. The returned task resolves once the
    /// bridge has stopped and both registry entries are gone.
    pub async fn create_session(
        self: &Arc<Self>,
        telephony: TelephonyLink,
        call_type: CallType,
        options: CallOptions,
    ) -> BridgeResult<(SessionKey, JoinHandle<Option<BridgeOutcome>>)> {
        let slot = self.reserve_slot()?;
        let link = self.connector.connect(&self.settings.realtime).await?;

        let key = SessionKey::new();
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (started_tx, started_rx) = oneshot::channel();

        let mut bridge = ProtocolBridge::new(
            CallState::new(call_type, options),
            self.settings.clone(),
            ConnectionHandle::new("telephony", telephony.outgoing),
            ConnectionHandle::new("backend", link.outgoing),
            Arc::clone(&self.tracker),
        );
        bridge.notify_call_started(started_tx);

        let handle = BridgeHandle {
            session_key: key,
            control: control_tx,
        };
        self.by_key.insert(key, handle.clone());
        info!(
            session_key = %key,
            backend = self.connector.name(),
            sessions = self.by_key.len(),
            "Session created"
        );

        let reactor = tokio::spawn(bridge.run(telephony.incoming, link.incoming, control_rx));

        let registrar = {
            let registry = Arc::clone(self);
            tokio::spawn(async move {
                let call_sid = started_rx.await.ok()?;
                registry.register_by_call_id(&call_sid, handle);
                Some(call_sid)
            })
        };

        let registry = Arc::clone(self);
        let supervisor = tokio::spawn(async move {
            let outcome = reactor.await;
            // The registrar settles once the bridge is dropped.
            let call_sid = registrar.await.ok().flatten();

            registry.by_key.remove(&key);
            if let Some(call_sid) = call_sid {
                registry
                    .by_call_id
                    .remove_if(&call_sid, |_, h| h.session_key == key);
            }
            drop(slot);
            info!(session_key = %key, sessions = registry.by_key.len(), "Session removed");

            match outcome {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!(session_key = %key, error = %e, "Bridge task failed");
                    None
                }
            }
        });

        Ok((key, supervisor))
    }

    pub fn register_by_call_id(&self, call_id: &str, handle: BridgeHandle) {
        debug!(call_sid = %call_id, session_key = %handle.session_key, "Registering call");
        if let Some(previous) = self.by_call_id.insert(call_id.to_string(), handle)
            && previous.is_running()
        {
            warn!(call_sid = %call_id, "Replaced a live bridge for the same call");
        }
    }

    pub fn get_by_call_id(&self, call_id: &str) -> Option<BridgeHandle> {
        self.by_call_id.get(call_id).map(|h| h.clone())
    }

    pub fn unregister_by_call_id(&self, call_id: &str) -> Option<BridgeHandle> {
        self.by_call_id.remove(call_id).map(|(_, h)| h)
    }

    /// Forward operator context to a running call.
    ///
    /// Returns false, with no side effects, if the call is unknown.
    pub fn inject_context(&self, call_id: &str, text: &str, history_summary: Option<&str>) -> bool {
        let Some(handle) = self.get_by_call_id(call_id) else {
            debug!(call_sid = %call_id, "Context injection for unknown call");
            return false;
        };
        handle.send(BridgeCommand::InjectContext {
            text: text.to_string(),
            history_summary: history_summary.map(str::to_string),
        })
    }
}
