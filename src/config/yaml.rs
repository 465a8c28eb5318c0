use serde::Deserialize;
use std::path::Path;

use super::{ConfigError, ConfigResult};

/// Complete YAML configuration structure
///
/// Every field is optional; anything left out keeps its default and can
/// still be overridden by environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// openai:
///   api_key: "sk-..."
///   realtime_url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview"
///   voice: "alloy"
///   instructions: "You are a helpful phone assistant."
///   temperature: 0.8
///   transcription_model: "whisper-1"
///   input_audio_format: "pcm16"
///
/// calls:
///   session_ready_timeout_secs: 15
///   idle_timeout_secs: 300
///   max_concurrent_calls: 50
///
/// security:
///   cors_allowed_origins: "*"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub calls: Option<CallsYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Realtime backend settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub realtime_url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    /// Set to an empty string to disable caller transcription
    pub transcription_model: Option<String>,
    /// `pcm16` or `g711_ulaw`
    pub input_audio_format: Option<String>,
}

/// Per-call limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CallsYaml {
    pub session_ready_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub max_concurrent_calls: Option<usize>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load a YAML configuration file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&contents)
    }

    /// Parse YAML text
    pub fn parse(contents: &str) -> ConfigResult<Self> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Yaml(e.to_string()))
    }
}
