//! OpenAI Realtime API backend.
//!
//! The bridge configures each session for µ-law output so agent audio can be
//! forwarded to the carrier without transcoding. Caller audio is sent either
//! as 16 kHz PCM16 (transcoded) or as µ-law passthrough.
//!
//! # Supported Voices
//!
//! alloy, ash, ballad, coral, echo, sage, shimmer, verse

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtimeConnector;
pub use config::{
    DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL, Modality, OPENAI_REALTIME_URL,
    OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice,
};
pub use messages::{
    ApiError, ClientEvent, ContentPart, ConversationItem, InputAudioTranscription, Response,
    ResponseConfig, ServerEvent, Session, SessionConfig, TurnDetection,
};
