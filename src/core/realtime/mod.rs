//! Realtime AI backend module.
//!
//! A backend is reached through a [`BackendConnector`], which opens a
//! session and hands back a [`BackendLink`] channel pair. The bridge owns
//! the link for the lifetime of one call.
//!
//! # Supported Providers
//!
//! - **OpenAI Realtime API** - full duplex audio with GPT-4o

mod base;
pub mod openai;
#[cfg(test)]
pub(crate) mod testing;

pub use base::{
    BackendConnector, BackendEvent, BackendLink, DEFAULT_INSTRUCTIONS, RealtimeConfig,
    RealtimeError, RealtimeResult, TurnDetectionConfig,
};
pub use openai::{
    ClientEvent, Modality, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat,
    OpenAIRealtimeConnector, OpenAIRealtimeVoice, ServerEvent,
};
