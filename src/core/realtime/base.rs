//! Base types for realtime AI backends.
//!
//! A backend session is exposed to the bridge as a pair of channels: a
//! sender for [`ClientEvent`]s and a receiver of [`BackendEvent`]s. The
//! WebSocket plumbing lives behind the [`BackendConnector`] trait so the
//! bridge can be driven by an in-memory connector in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::openai::{
    ClientEvent, DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL, Modality,
    OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice, ServerEvent,
    TurnDetection,
};

/// Default system instructions when neither config nor call provides any.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful phone assistant.";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Configuration for a realtime backend session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// API key for authentication
    pub api_key: String,

    /// WebSocket endpoint, without the model query parameter
    pub url: String,

    /// Model to use (e.g., "gpt-4o-realtime-preview")
    pub model: String,

    /// Default voice; a call may override it
    pub voice: OpenAIRealtimeVoice,

    /// Default system instructions; a call may override them
    pub instructions: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Format of caller audio sent to the backend
    pub input_audio_format: OpenAIRealtimeAudioFormat,

    /// Format of agent audio requested from the backend
    pub output_audio_format: OpenAIRealtimeAudioFormat,

    /// Input transcription model; `None` disables caller transcripts
    pub transcription_model: Option<String>,

    /// Turn detection mode
    pub turn_detection: TurnDetectionConfig,

    /// Response modalities
    pub modalities: Vec<Modality>,

    /// Timeout for the WebSocket handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: OPENAI_REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: OpenAIRealtimeVoice::default(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            temperature: 0.8,
            input_audio_format: OpenAIRealtimeAudioFormat::Pcm16,
            output_audio_format: OpenAIRealtimeAudioFormat::G711Ulaw,
            transcription_model: Some(DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            turn_detection: TurnDetectionConfig::default(),
            modalities: vec![Modality::Text, Modality::Audio],
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RealtimeConfig {
    /// Check the settings required to open a session.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        if self.output_audio_format != OpenAIRealtimeAudioFormat::G711Ulaw {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "output audio format must be g711_ulaw, got {}",
                self.output_audio_format
            )));
        }
        if self.modalities.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "at least one modality is required".to_string(),
            ));
        }
        Ok(())
    }

    /// WebSocket URL including the model parameter.
    pub fn ws_url(&self) -> String {
        format!("{}?model={}", self.url, self.model)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Configuration for turn detection (VAD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetectionConfig {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(default)]
        threshold: Option<f32>,
        /// Amount of audio to include before voice detection (ms)
        #[serde(default)]
        prefix_padding_ms: Option<u32>,
        /// Silence duration before end of turn (ms)
        #[serde(default)]
        silence_duration_ms: Option<u32>,
    },
    /// No automatic turn detection
    #[serde(rename = "none")]
    None,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        TurnDetectionConfig::ServerVad {
            threshold: Some(0.5),
            prefix_padding_ms: Some(300),
            silence_duration_ms: Some(500),
        }
    }
}

impl From<&TurnDetectionConfig> for TurnDetection {
    fn from(config: &TurnDetectionConfig) -> Self {
        match config {
            TurnDetectionConfig::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            } => TurnDetection::ServerVad {
                threshold: *threshold,
                prefix_padding_ms: *prefix_padding_ms,
                silence_duration_ms: *silence_duration_ms,
            },
            TurnDetectionConfig::None => TurnDetection::None {},
        }
    }
}

// =============================================================================
// Backend Link
// =============================================================================

/// Event delivered from a backend session to its bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// A parsed server event, in receipt order.
    Server(ServerEvent),
    /// The session ended. No further events follow.
    Closed { reason: Option<String> },
}

/// Channel pair connected to one live backend session.
///
/// Dropping `outgoing` closes the session.
#[derive(Debug)]
pub struct BackendLink {
    pub outgoing: mpsc::Sender<ClientEvent>,
    pub incoming: mpsc::Receiver<BackendEvent>,
}

/// Opens backend sessions.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Open a new session. The caller sends `session.update` itself.
    async fn connect(&self, config: &RealtimeConfig) -> RealtimeResult<BackendLink>;

    /// Short identifier for logs.
    fn name(&self) -> &'static str;
}
