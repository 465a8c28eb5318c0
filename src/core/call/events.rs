//! Call event stream for external observers.
//!
//! Bridges publish transcript, status and command events here; dashboards
//! and the `/calls/{call_sid}/events` socket subscribe.

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use super::state::Role;
use super::tracker::CallStatus;

/// Default capacity of the broadcast ring.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Marks system transcript events that stand for something other than speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptTag {
    Interruption,
    BackendError,
    Dtmf,
    ContextInjected,
}

/// An observable event on a call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    SessionStart {
        call_sid: String,
        stream_sid: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    Transcript {
        call_sid: Option<String>,
        role: Role,
        text: String,
        partial: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        tag: Option<TranscriptTag>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    Status {
        call_sid: String,
        status: CallStatus,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    Command {
        call_sid: Option<String>,
        command: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    SessionEnd {
        call_sid: String,
        status: CallStatus,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
}

impl CallEvent {
    pub fn transcript(
        call_sid: Option<String>,
        role: Role,
        text: impl Into<String>,
        partial: bool,
    ) -> Self {
        Self::Transcript {
            call_sid,
            role,
            text: text.into(),
            partial,
            tag: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// A final system transcript event carrying a tag.
    pub fn system(call_sid: Option<String>, tag: TranscriptTag, text: impl Into<String>) -> Self {
        Self::tagged(call_sid, Role::System, tag, text)
    }

    pub fn tagged(
        call_sid: Option<String>,
        role: Role,
        tag: TranscriptTag,
        text: impl Into<String>,
    ) -> Self {
        Self::Transcript {
            call_sid,
            role,
            text: text.into(),
            partial: false,
            tag: Some(tag),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn command(call_sid: Option<String>, command: &str, value: Option<String>) -> Self {
        Self::Command {
            call_sid,
            command: command.to_string(),
            value,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// The call this event belongs to, if known.
    pub fn call_sid(&self) -> Option<&str> {
        match self {
            Self::SessionStart { call_sid, .. }
            | Self::Status { call_sid, .. }
            | Self::SessionEnd { call_sid, .. } => Some(call_sid),
            Self::Transcript { call_sid, .. } | Self::Command { call_sid, .. } => {
                call_sid.as_deref()
            }
        }
    }
}

/// Fan-out publisher for [`CallEvent`]s.
///
/// Publishing never blocks and never fails; events are dropped when nobody
/// is subscribed and lagging subscribers skip ahead.
#[derive(Debug, Clone)]
pub struct CallEventBus {
    sender: broadcast::Sender<CallEvent>,
}

impl CallEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: CallEvent) {
        // Err only means there are no subscribers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.sender.subscribe()
    }
}

impl Default for CallEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
