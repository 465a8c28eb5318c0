//! Per-call mutable state owned by a single bridge.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

// =============================================================================
// Conversation
// =============================================================================

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One utterance in the call transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Direction of the call relative to this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Outbound,
    Inbound,
}

impl CallType {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "inbound" => Self::Inbound,
            _ => Self::Outbound,
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// Caller-supplied settings for a new call.
///
/// Every field is optional; `None` falls back to the server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallOptions {
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub voice: Option<String>,
    pub system_instructions: Option<String>,
    pub call_instructions: Option<String>,
    pub call_context: Option<String>,
}

impl CallOptions {
    /// Combined instructions sent to the backend in `session.update`.
    pub fn combined_instructions(&self, fallback: &str) -> String {
        let mut parts = vec![
            self.system_instructions
                .as_deref()
                .unwrap_or(fallback)
                .to_string(),
        ];
        if let Some(call) = self.call_instructions.as_deref()
            && !call.is_empty()
        {
            parts.push(call.to_string());
        }
        if let Some(ctx) = self.call_context.as_deref()
            && !ctx.is_empty()
        {
            parts.push(format!("Call context:\n{ctx}"));
        }
        parts.join("\n\n")
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Which protocol leg a diagnostic entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSide {
    Telephony,
    Backend,
}

/// A timestamped diagnostic record.
///
/// `payload` is an owned snapshot taken when the entry is created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub event_type: String,
    pub payload: Value,
}

// =============================================================================
// CallState
// =============================================================================

/// Mutable record for one call.
#[derive(Debug)]
pub struct CallState {
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    pub call_type: CallType,
    pub options: CallOptions,

    /// True while agent audio is being streamed to the caller.
    pub speaking: bool,
    /// Telephony timestamp at which the in-flight agent response began.
    pub response_start_timestamp: Option<u64>,
    /// Backend item id of the most recent agent response.
    pub last_assistant_item: Option<String>,

    latest_media_timestamp: u64,
    transcript: Vec<ConversationMessage>,
    mark_queue: VecDeque<String>,
    mark_sequence: u64,
    telephony_log: Vec<DiagnosticEntry>,
    backend_log: Vec<DiagnosticEntry>,
}

impl CallState {
    pub fn new(call_type: CallType, options: CallOptions) -> Self {
        Self {
            stream_sid: None,
            call_sid: None,
            call_type,
            options,
            speaking: false,
            response_start_timestamp: None,
            last_assistant_item: None,
            latest_media_timestamp: 0,
            transcript: Vec::new(),
            mark_queue: VecDeque::new(),
            mark_sequence: 0,
            telephony_log: Vec::new(),
            backend_log: Vec::new(),
        }
    }

    // ---- timing ----------------------------------------------------------

    pub fn latest_media_timestamp(&self) -> u64 {
        self.latest_media_timestamp
    }

    /// Record a media timestamp. Older timestamps never move the clock back.
    pub fn observe_media_timestamp(&mut self, timestamp: u64) -> u64 {
        if timestamp > self.latest_media_timestamp {
            self.latest_media_timestamp = timestamp;
        }
        self.latest_media_timestamp
    }

    /// Mark the start of an agent utterance if one is not already in flight.
    ///
    /// Returns true when this call started a new utterance.
    pub fn begin_response(&mut self) -> bool {
        if self.response_start_timestamp.is_some() {
            return false;
        }
        self.response_start_timestamp = Some(self.latest_media_timestamp);
        true
    }

    /// Abandon the in-flight utterance.
    ///
    /// Returns the milliseconds of agent audio the caller heard, or `None`
    /// if nothing was in flight. Clears the mark queue.
    pub fn reset_response(&mut self) -> Option<u64> {
        let start = self.response_start_timestamp.take()?;
        self.speaking = false;
        self.mark_queue.clear();
        Some(self.latest_media_timestamp.saturating_sub(start))
    }

    // ---- transcript ------------------------------------------------------

    pub fn append_message(&mut self, message: ConversationMessage) {
        self.transcript.push(message);
    }

    pub fn transcript(&self) -> &[ConversationMessage] {
        &self.transcript
    }

    // ---- marks -----------------------------------------------------------

    /// Append a fresh playback marker and return its name.
    pub fn push_mark(&mut self) -> String {
        self.mark_sequence += 1;
        let name = format!("response-part-{}", self.mark_sequence);
        self.mark_queue.push_back(name.clone());
        name
    }

    /// Drop an acknowledged marker together with every marker queued before it.
    ///
    /// Returns how many markers were removed. Unknown names remove nothing.
    pub fn acknowledge_mark(&mut self, name: &str) -> usize {
        match self.mark_queue.iter().position(|m| m == name) {
            Some(index) => {
                self.mark_queue.drain(..=index);
                index + 1
            }
            None => 0,
        }
    }

    pub fn mark_queue(&self) -> &VecDeque<String> {
        &self.mark_queue
    }

    // ---- diagnostics -----------------------------------------------------

    pub fn log_event(&mut self, side: LogSide, event_type: impl Into<String>, payload: Value) {
        let entry = DiagnosticEntry {
            timestamp: OffsetDateTime::now_utc(),
            event_type: event_type.into(),
            payload,
        };
        match side {
            LogSide::Telephony => self.telephony_log.push(entry),
            LogSide::Backend => self.backend_log.push(entry),
        }
    }

    pub fn diagnostics(&self, side: LogSide) -> &[DiagnosticEntry] {
        match side {
            LogSide::Telephony => &self.telephony_log,
            LogSide::Backend => &self.backend_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> CallState {
        CallState::new(CallType::Outbound, CallOptions::default())
    }

    #[test]
    fn test_media_timestamp_is_monotonic() {
        let mut s = state();
        assert_eq!(s.observe_media_timestamp(100), 100);
        assert_eq!(s.observe_media_timestamp(40), 100);
        assert_eq!(s.observe_media_timestamp(160), 160);
        assert_eq!(s.latest_media_timestamp(), 160);
    }

    #[test]
    fn test_begin_response_captures_once() {
        let mut s = state();
        s.observe_media_timestamp(500);
        assert!(s.begin_response());
        s.observe_media_timestamp(900);
        assert!(!s.begin_response());
        assert_eq!(s.response_start_timestamp, Some(500));
    }

    #[test]
    fn test_reset_response_reports_elapsed_and_clears() {
        let mut s = state();
        s.observe_media_timestamp(1_000);
        s.begin_response();
        s.speaking = true;
        s.push_mark();
        s.push_mark();
        s.observe_media_timestamp(1_750);

        assert_eq!(s.reset_response(), Some(750));
        assert!(!s.speaking);
        assert!(s.response_start_timestamp.is_none());
        assert!(s.mark_queue().is_empty());
        assert_eq!(s.reset_response(), None);
    }

    #[test]
    fn test_marks_drain_acknowledged_prefix() {
        let mut s = state();
        let first = s.push_mark();
        let second = s.push_mark();
        let third = s.push_mark();
        assert_eq!(first, "response-part-1");

        assert_eq!(s.acknowledge_mark(&second), 2);
        assert_eq!(s.mark_queue().iter().collect::<Vec<_>>(), vec![&third]);
        assert_eq!(s.acknowledge_mark("unknown"), 0);
        assert_eq!(s.mark_queue().len(), 1);
    }

    #[test]
    fn test_transcript_preserves_order() {
        let mut s = state();
        s.append_message(ConversationMessage::new(Role::User, "hello"));
        s.append_message(ConversationMessage::new(Role::Assistant, "hi there"));
        let roles: Vec<Role> = s.transcript().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn test_diagnostic_payload_is_a_snapshot() {
        let mut s = state();
        let mut payload = json!({"event": "start", "count": 1});
        s.log_event(LogSide::Telephony, "start", payload.clone());
        payload["count"] = json!(2);

        let logged = &s.diagnostics(LogSide::Telephony)[0];
        assert_eq!(logged.event_type, "start");
        assert_eq!(logged.payload["count"], 1);
        assert!(s.diagnostics(LogSide::Backend).is_empty());
    }

    #[test]
    fn test_combined_instructions() {
        let options = CallOptions {
            call_instructions: Some("Book a table for two.".into()),
            call_context: Some("Customer prefers 7pm.".into()),
            ..Default::default()
        };
        let text = options.combined_instructions("You are a phone assistant.");
        assert_eq!(
            text,
            "You are a phone assistant.\n\nBook a table for two.\n\nCall context:\nCustomer prefers 7pm."
        );

        let plain = CallOptions::default().combined_instructions("base");
        assert_eq!(plain, "base");
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_call_type_parse() {
        assert_eq!(CallType::from_str_or_default("INBOUND"), CallType::Inbound);
        assert_eq!(CallType::from_str_or_default("other"), CallType::Outbound);
    }
}
