//! External-facing directory of calls and their lifecycle status.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::events::{CallEvent, CallEventBus};
use super::state::{CallType, ConversationMessage};

/// Lifecycle status of a call.
///
/// ```text
/// initiated -> in-progress -> active -> { on_hold, completed, failed }
/// on_hold -> active
/// ```
///
/// Any non-terminal status may also move straight to `completed` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    #[serde(rename = "initiated")]
    Initiated,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "on_hold")]
    OnHold,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl CallStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::InProgress => "in-progress",
            Self::Active => "active",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Completed | Failed)
                | (Initiated, InProgress)
                | (InProgress, Active)
                | (Active, OnHold)
                | (OnHold, Active)
        )
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Call not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: CallStatus, to: CallStatus },
}

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Summary of a live call as seen from outside the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveCall {
    pub call_sid: String,
    pub stream_sid: Option<String>,
    pub call_type: CallType,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub status: CallStatus,
    /// Identifier assigned by the carrier, when it differs from `call_sid`.
    pub carrier_call_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub transcript: Vec<ConversationMessage>,
}

impl ActiveCall {
    pub fn new(call_sid: impl Into<String>, call_type: CallType) -> Self {
        Self {
            call_sid: call_sid.into(),
            stream_sid: None,
            call_type,
            from_number: None,
            to_number: None,
            status: CallStatus::Initiated,
            carrier_call_id: None,
            started_at: OffsetDateTime::now_utc(),
            transcript: Vec::new(),
        }
    }
}

/// Tracks active calls and publishes status changes on the event bus.
pub struct CallTracker {
    calls: DashMap<String, ActiveCall>,
    events: CallEventBus,
}

impl CallTracker {
    pub fn new(events: CallEventBus) -> Self {
        Self {
            calls: DashMap::new(),
            events,
        }
    }

    pub fn events(&self) -> &CallEventBus {
        &self.events
    }

    /// Insert a call unless one with the same sid is already tracked.
    ///
    /// Returns false when the call already existed.
    pub fn begin_call(&self, call: ActiveCall) -> bool {
        let call_sid = call.call_sid.clone();
        let mut inserted = false;
        self.calls.entry(call_sid.clone()).or_insert_with(|| {
            inserted = true;
            call
        });
        if inserted {
            info!(call_sid = %call_sid, "Tracking call");
        }
        inserted
    }

    /// Move a call to `next`, publishing a status event on success.
    ///
    /// Re-applying the current status is a no-op that still succeeds.
    pub fn update_status(&self, call_sid: &str, next: CallStatus) -> TrackerResult<CallStatus> {
        let previous = {
            let mut call = self
                .calls
                .get_mut(call_sid)
                .ok_or_else(|| TrackerError::NotFound(call_sid.to_string()))?;
            let previous = call.status;
            if previous == next {
                return Ok(previous);
            }
            if !previous.can_transition_to(next) {
                warn!(call_sid = %call_sid, from = %previous, to = %next, "Rejected status transition");
                return Err(TrackerError::InvalidTransition { from: previous, to: next });
            }
            call.status = next;
            previous
        };

        debug!(call_sid = %call_sid, from = %previous, to = %next, "Call status changed");
        self.events.publish(CallEvent::Status {
            call_sid: call_sid.to_string(),
            status: next,
            timestamp: OffsetDateTime::now_utc(),
        });
        Ok(previous)
    }

    pub fn append_transcript(&self, call_sid: &str, message: ConversationMessage) {
        if let Some(mut call) = self.calls.get_mut(call_sid) {
            call.transcript.push(message);
        }
    }

    pub fn get(&self, call_sid: &str) -> Option<ActiveCall> {
        self.calls.get(call_sid).map(|c| c.clone())
    }

    pub fn list(&self) -> Vec<ActiveCall> {
        self.calls.iter().map(|c| c.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Apply a terminal status, publish `session_end` and stop tracking the call.
    pub fn end_call(&self, call_sid: &str, status: CallStatus) -> Option<ActiveCall> {
        if let Err(e) = self.update_status(call_sid, status) {
            debug!(call_sid = %call_sid, error = %e, "Terminal status not applied");
        }
        let (_, call) = self.calls.remove(call_sid)?;
        info!(call_sid = %call_sid, status = %call.status, "Call ended");
        self.events.publish(CallEvent::SessionEnd {
            call_sid: call_sid.to_string(),
            status: call.status,
            timestamp: OffsetDateTime::now_utc(),
        });
        Some(call)
    }
}

impl Default for CallTracker {
    fn default() -> Self {
        Self::new(CallEventBus::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call::state::Role;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&CallStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        assert_eq!(
            serde_json::to_string(&CallStatus::OnHold).unwrap(),
            "\"on_hold\""
        );
    }

    #[test]
    fn test_status_machine() {
        use CallStatus::*;
        assert!(Initiated.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Active));
        assert!(Active.can_transition_to(OnHold));
        assert!(OnHold.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Initiated.can_transition_to(Failed));

        assert!(!Initiated.can_transition_to(Active));
        assert!(!OnHold.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[tokio::test]
    async fn test_update_status_publishes() {
        let tracker = CallTracker::default();
        let mut rx = tracker.events().subscribe();
        tracker.begin_call(ActiveCall::new("CA1", CallType::Outbound));

        assert_eq!(
            tracker.update_status("CA1", CallStatus::InProgress),
            Ok(CallStatus::Initiated)
        );
        match rx.recv().await.unwrap() {
            CallEvent::Status { call_sid, status, .. } => {
                assert_eq!(call_sid, "CA1");
                assert_eq!(status, CallStatus::InProgress);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_update_status_errors() {
        let tracker = CallTracker::default();
        assert_eq!(
            tracker.update_status("missing", CallStatus::Active),
            Err(TrackerError::NotFound("missing".into()))
        );

        tracker.begin_call(ActiveCall::new("CA1", CallType::Outbound));
        assert_eq!(
            tracker.update_status("CA1", CallStatus::OnHold),
            Err(TrackerError::InvalidTransition {
                from: CallStatus::Initiated,
                to: CallStatus::OnHold
            })
        );
        assert_eq!(tracker.get("CA1").unwrap().status, CallStatus::Initiated);
    }

    #[test]
    fn test_begin_call_keeps_existing() {
        let tracker = CallTracker::default();
        assert!(tracker.begin_call(ActiveCall::new("CA1", CallType::Outbound)));
        tracker.update_status("CA1", CallStatus::InProgress).unwrap();
        assert!(!tracker.begin_call(ActiveCall::new("CA1", CallType::Inbound)));
        assert_eq!(tracker.get("CA1").unwrap().status, CallStatus::InProgress);
    }

    #[test]
    fn test_transcript_copy_and_end() {
        let tracker = CallTracker::default();
        tracker.begin_call(ActiveCall::new("CA1", CallType::Outbound));
        tracker.append_transcript("CA1", ConversationMessage::new(Role::User, "hi"));
        tracker.append_transcript("missing", ConversationMessage::new(Role::User, "lost"));

        let ended = tracker.end_call("CA1", CallStatus::Completed).unwrap();
        assert_eq!(ended.status, CallStatus::Completed);
        assert_eq!(ended.transcript.len(), 1);
        assert!(tracker.is_empty());
        assert!(tracker.end_call("CA1", CallStatus::Completed).is_none());
    }
}
