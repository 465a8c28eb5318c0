//! Telephony media stream message types
//!
//! JSON frames exchanged with the carrier's bidirectional media stream. All
//! frames carry an `event` discriminator; audio is base64 G.711 µ-law at
//! 8 kHz mono.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::audio::encode_base64;
use crate::core::call::CallOptions;

/// Maximum accepted size of a single telephony frame (64 KB).
pub const MAX_TELEPHONY_FRAME_SIZE: usize = 64 * 1024;

// =============================================================================
// Incoming Messages (Carrier -> Bridge)
// =============================================================================

/// Frames received from the carrier.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyMessage {
    /// First frame after the socket opens.
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },

    /// Stream metadata for the call.
    Start {
        start: StartPayload,
    },

    /// One chunk of caller audio.
    Media {
        media: MediaPayload,
    },

    /// Playback acknowledgement for a mark previously sent by the bridge.
    Mark {
        mark: MarkPayload,
    },

    /// Keypad press detected on the caller's leg.
    Dtmf {
        dtmf: DtmfPayload,
    },

    /// The carrier closed the stream.
    Stop,
}

impl TelephonyMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Mark { .. } => "mark",
            Self::Dtmf { .. } => "dtmf",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StartPayload {
    /// Overlay custom stream parameters onto `options`.
    ///
    /// Recognised keys: `from`, `to`, `voice`, `instructions`, `context`.
    pub fn apply_to(&self, options: &mut CallOptions) {
        let params = &self.custom_parameters;
        if let Some(v) = params.get("from") {
            options.from_number = Some(v.clone());
        }
        if let Some(v) = params.get("to") {
            options.to_number = Some(v.clone());
        }
        if let Some(v) = params.get("voice") {
            options.voice = Some(v.clone());
        }
        if let Some(v) = params.get("instructions") {
            options.call_instructions = Some(v.clone());
        }
        if let Some(v) = params.get("context") {
            options.call_context = Some(v.clone());
        }
    }

    /// Call direction carried in the `direction` parameter.
    pub fn direction(&self) -> Option<&str> {
        self.custom_parameters.get("direction").map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64 µ-law audio.
    pub payload: String,
    /// Milliseconds since the stream started.
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: u64,
    #[serde(default)]
    pub track: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
}

/// The carrier sends timestamps as decimal strings; accept numbers too.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Number(u64),
        Text(String),
    }

    match Timestamp::deserialize(deserializer)? {
        Timestamp::Number(n) => Ok(n),
        Timestamp::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Outgoing Messages (Bridge -> Carrier)
// =============================================================================

/// Frames sent to the carrier.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyCommand {
    /// Queue audio for playback to the caller.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Ask the carrier to echo `name` back once preceding audio has played.
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },

    /// Discard all audio queued for playback.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboundMedia {
    pub payload: String,
}

impl TelephonyCommand {
    /// Media frame with an already base64-encoded payload.
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }

    /// Media frame from raw µ-law bytes.
    pub fn media_from_ulaw(stream_sid: impl Into<String>, ulaw: &[u8]) -> Self {
        Self::media(stream_sid, encode_base64(ulaw))
    }

    pub fn mark(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Mark {
            stream_sid: stream_sid.into(),
            mark: MarkPayload { name: name.into() },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        Self::Clear {
            stream_sid: stream_sid.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start() {
        let raw = json!({
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "accountSid": "AC123",
                "streamSid": "MZ123",
                "callSid": "CA123",
                "tracks": ["inbound"],
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1},
                "customParameters": {"from": "+15550001111", "direction": "inbound"}
            },
            "streamSid": "MZ123"
        });
        let msg: TelephonyMessage = serde_json::from_value(raw).unwrap();
        let TelephonyMessage::Start { start } = msg else {
            panic!("expected start");
        };
        assert_eq!(start.stream_sid, "MZ123");
        assert_eq!(start.call_sid, "CA123");
        assert_eq!(start.direction(), Some("inbound"));

        let mut options = CallOptions::default();
        start.apply_to(&mut options);
        assert_eq!(options.from_number.as_deref(), Some("+15550001111"));
        assert!(options.to_number.is_none());
    }

    #[test]
    fn test_parse_media_with_string_timestamp() {
        let raw = r#"{"event":"media","sequenceNumber":"3","media":{"track":"inbound","chunk":"1","timestamp":"5120","payload":"//8="},"streamSid":"MZ1"}"#;
        let msg: TelephonyMessage = serde_json::from_str(raw).unwrap();
        match msg {
            TelephonyMessage::Media { media } => {
                assert_eq!(media.timestamp, 5120);
                assert_eq!(media.payload, "//8=");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_with_numeric_timestamp() {
        let raw = r#"{"event":"media","media":{"timestamp":40,"payload":""}}"#;
        let msg: TelephonyMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, TelephonyMessage::Media { media } if media.timestamp == 40));
    }

    #[test]
    fn test_parse_mark_dtmf_stop() {
        let mark: TelephonyMessage =
            serde_json::from_str(r#"{"event":"mark","streamSid":"MZ1","mark":{"name":"response-part-1"}}"#)
                .unwrap();
        assert_eq!(mark.event_name(), "mark");

        let dtmf: TelephonyMessage =
            serde_json::from_str(r#"{"event":"dtmf","dtmf":{"track":"inbound_track","digit":"7"}}"#)
                .unwrap();
        assert!(matches!(dtmf, TelephonyMessage::Dtmf { dtmf } if dtmf.digit == "7"));

        let stop: TelephonyMessage =
            serde_json::from_str(r#"{"event":"stop","streamSid":"MZ1","stop":{"callSid":"CA1"}}"#)
                .unwrap();
        assert!(matches!(stop, TelephonyMessage::Stop));
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        assert!(serde_json::from_str::<TelephonyMessage>(r#"{"event":"bogus"}"#).is_err());
    }

    #[test]
    fn test_serialize_commands() {
        let media = serde_json::to_value(TelephonyCommand::media_from_ulaw("MZ1", &[0xFF, 0xFF])).unwrap();
        assert_eq!(
            media,
            json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "//8="}})
        );

        let mark = serde_json::to_value(TelephonyCommand::mark("MZ1", "response-part-2")).unwrap();
        assert_eq!(
            mark,
            json!({"event": "mark", "streamSid": "MZ1", "mark": {"name": "response-part-2"}})
        );

        let clear = serde_json::to_value(TelephonyCommand::clear("MZ1")).unwrap();
        assert_eq!(clear, json!({"event": "clear", "streamSid": "MZ1"}));
    }
}
