//! Environment variable overrides.
//!
//! `.env` is loaded into the process environment by `main` before any of
//! this runs, so both sources look the same here.

use std::env;
use std::str::FromStr;

use crate::core::realtime::{OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice};

use super::{ConfigError, ConfigResult, ServerConfig};

/// Read a variable, treating an empty value as unset.
fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &'static str) -> ConfigResult<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(None),
    }
}

pub(super) fn parse_audio_format(
    key: &'static str,
    raw: &str,
) -> ConfigResult<OpenAIRealtimeAudioFormat> {
    OpenAIRealtimeAudioFormat::parse(raw.trim()).ok_or_else(|| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

pub(super) fn parse_voice(key: &'static str, raw: &str) -> ConfigResult<OpenAIRealtimeVoice> {
    OpenAIRealtimeVoice::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

/// Apply every recognized variable on top of `config`.
pub(super) fn apply_env(config: &mut ServerConfig) -> ConfigResult<()> {
    if let Some(host) = env_string("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse("PORT")? {
        config.port = port;
    }

    if let Some(key) = env_string("OPENAI_API_KEY") {
        config.openai_api_key = Some(key);
    }
    if let Some(url) = env_string("OPENAI_REALTIME_URL") {
        config.realtime_url = url;
    }
    if let Some(model) = env_string("OPENAI_REALTIME_MODEL") {
        config.model = model;
    }
    if let Some(voice) = env_string("OPENAI_VOICE") {
        config.voice = parse_voice("OPENAI_VOICE", &voice)?;
    }
    if let Some(instructions) = env_string("SYSTEM_INSTRUCTIONS") {
        config.instructions = instructions;
    }
    if let Some(temperature) = env_parse("OPENAI_TEMPERATURE")? {
        config.temperature = temperature;
    }
    // Set but empty disables transcription; unset keeps the current value.
    if let Ok(model) = env::var("OPENAI_TRANSCRIPTION_MODEL") {
        config.transcription_model = Some(model).filter(|m| !m.trim().is_empty());
    }
    if let Some(format) = env_string("BACKEND_INPUT_FORMAT") {
        config.backend_input_format = parse_audio_format("BACKEND_INPUT_FORMAT", &format)?;
    }

    if let Some(secs) = env_parse("SESSION_READY_TIMEOUT_SECS")? {
        config.session_ready_timeout_secs = secs;
    }
    if let Some(secs) = env_parse("IDLE_TIMEOUT_SECS")? {
        config.idle_timeout_secs = secs;
    }
    if let Some(max) = env_parse("MAX_CONCURRENT_CALLS")? {
        config.max_concurrent_calls = Some(max);
    }
    if let Some(origins) = env_string("CORS_ALLOWED_ORIGINS") {
        config.cors_allowed_origins = Some(origins);
    }

    Ok(())
}
