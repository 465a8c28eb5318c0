//! Configuration module for the callbridge server
//!
//! Settings come from defaults, an optional YAML file and environment
//! variables, in increasing priority. `.env` values are loaded into the
//! environment by `main` before anything here runs.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable overrides
//!
//! # Example
//! ```rust,no_run
//! use callbridge::config::ServerConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(Path::new("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::core::bridge::BridgeSettings;
use crate::core::realtime::{
    DEFAULT_INSTRUCTIONS, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice,
    RealtimeConfig,
};
use crate::core::realtime::openai::{DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL};

mod env;
mod yaml;

pub use yaml::YamlConfig;

/// Temperatures accepted by the realtime API.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.6..=1.2;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(String),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Server configuration
///
/// Contains everything needed to run the bridge server:
/// - listener settings (host, port)
/// - realtime backend credentials and session defaults
/// - per-call timeouts and the concurrent call cap
/// - CORS policy for the operator API
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Realtime backend
    /// OpenAI API key; calls fail to connect without one
    pub openai_api_key: Option<String>,
    pub realtime_url: String,
    pub model: String,
    pub voice: OpenAIRealtimeVoice,
    /// System instructions used when a call supplies none
    pub instructions: String,
    pub temperature: f32,
    /// `None` disables caller transcription
    pub transcription_model: Option<String>,
    /// Format caller audio is forwarded in
    pub backend_input_format: OpenAIRealtimeAudioFormat,

    // Call limits
    pub session_ready_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Maximum live bridges. Default: None (unlimited)
    pub max_concurrent_calls: Option<usize>,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (same-origin only)
    pub cors_allowed_origins: Option<String>,
}

/// Zeroize the API key when the config is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            openai_api_key: None,
            realtime_url: OPENAI_REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            voice: OpenAIRealtimeVoice::default(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            temperature: 0.8,
            transcription_model: Some(DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            backend_input_format: OpenAIRealtimeAudioFormat::Pcm16,
            session_ready_timeout_secs: 15,
            idle_timeout_secs: 300,
            max_concurrent_calls: None,
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from defaults and environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables (actual ENV vars override .env values)
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - A value has an invalid format
    /// - Configuration validation fails
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        config.apply_yaml(yaml_config)?;
        env::apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) -> ConfigResult<()> {
        if let Some(server) = yaml.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
        }

        if let Some(openai) = yaml.openai {
            if let Some(key) = openai.api_key.filter(|k| !k.is_empty()) {
                self.openai_api_key = Some(key);
            }
            if let Some(url) = openai.realtime_url {
                self.realtime_url = url;
            }
            if let Some(model) = openai.model {
                self.model = model;
            }
            if let Some(voice) = openai.voice {
                self.voice = env::parse_voice("openai.voice", &voice)?;
            }
            if let Some(instructions) = openai.instructions {
                self.instructions = instructions;
            }
            if let Some(temperature) = openai.temperature {
                self.temperature = temperature;
            }
            if let Some(model) = openai.transcription_model {
                self.transcription_model = Some(model).filter(|m| !m.trim().is_empty());
            }
            if let Some(format) = openai.input_audio_format {
                self.backend_input_format =
                    env::parse_audio_format("openai.input_audio_format", &format)?;
            }
        }

        if let Some(calls) = yaml.calls {
            if let Some(secs) = calls.session_ready_timeout_secs {
                self.session_ready_timeout_secs = secs;
            }
            if let Some(secs) = calls.idle_timeout_secs {
                self.idle_timeout_secs = secs;
            }
            if calls.max_concurrent_calls.is_some() {
                self.max_concurrent_calls = calls.max_concurrent_calls;
            }
        }

        if let Some(security) = yaml.security
            && security.cors_allowed_origins.is_some()
        {
            self.cors_allowed_origins = security.cors_allowed_origins;
        }

        Ok(())
    }

    /// Check value ranges that parsing alone cannot enforce
    pub fn validate(&self) -> ConfigResult<()> {
        if self.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".into()));
        }
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "temperature {} outside {:?}",
                self.temperature, TEMPERATURE_RANGE
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model must not be empty".into()));
        }
        match url::Url::parse(&self.realtime_url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "realtime_url must be a ws:// or wss:// URL, got {}",
                    self.realtime_url
                )));
            }
        }
        if self.session_ready_timeout_secs == 0 || self.idle_timeout_secs == 0 {
            return Err(ConfigError::Validation("timeouts must be non-zero".into()));
        }
        if self.max_concurrent_calls == Some(0) {
            return Err(ConfigError::Validation(
                "max_concurrent_calls must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_api_key(&self) -> bool {
        self.openai_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Session defaults handed to every new backend connection
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            url: self.realtime_url.clone(),
            model: self.model.clone(),
            voice: self.voice,
            instructions: self.instructions.clone(),
            temperature: self.temperature,
            input_audio_format: self.backend_input_format,
            transcription_model: self.transcription_model.clone(),
            ..RealtimeConfig::default()
        }
    }

    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            realtime: self.realtime_config(),
            session_ready_timeout: Duration::from_secs(self.session_ready_timeout_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::{env, fs};
    use tempfile::TempDir;

    const ENV_KEYS: &[&str] = &[
        "HOST",
        "PORT",
        "OPENAI_API_KEY",
        "OPENAI_REALTIME_URL",
        "OPENAI_REALTIME_MODEL",
        "OPENAI_VOICE",
        "SYSTEM_INSTRUCTIONS",
        "OPENAI_TEMPERATURE",
        "OPENAI_TRANSCRIPTION_MODEL",
        "BACKEND_INPUT_FORMAT",
        "SESSION_READY_TIMEOUT_SECS",
        "IDLE_TIMEOUT_SECS",
        "MAX_CONCURRENT_CALLS",
        "CORS_ALLOWED_ORIGINS",
    ];

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for key in ENV_KEYS {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.address(), "0.0.0.0:3001");
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = ServerConfig::default();
        config.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = ServerConfig::default();
        config.temperature = 1.5;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.realtime_url = "https://api.openai.com/v1/realtime".into();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.max_concurrent_calls = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bridge_settings_conversion() {
        let mut config = ServerConfig::default();
        config.openai_api_key = Some("sk-test".into());
        config.voice = OpenAIRealtimeVoice::Coral;
        config.backend_input_format = OpenAIRealtimeAudioFormat::G711Ulaw;
        config.transcription_model = None;
        config.session_ready_timeout_secs = 5;
        config.idle_timeout_secs = 30;

        let settings = config.bridge_settings();
        assert_eq!(settings.realtime.api_key, "sk-test");
        assert_eq!(settings.realtime.voice, OpenAIRealtimeVoice::Coral);
        assert_eq!(
            settings.realtime.input_audio_format,
            OpenAIRealtimeAudioFormat::G711Ulaw
        );
        assert_eq!(
            settings.realtime.output_audio_format,
            OpenAIRealtimeAudioFormat::G711Ulaw
        );
        assert!(settings.realtime.transcription_model.is_none());
        assert_eq!(settings.session_ready_timeout, Duration::from_secs(5));
        assert_eq!(settings.idle_timeout, Duration::from_secs(30));
        assert!(settings.realtime.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "4000");
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("OPENAI_VOICE", "Sage");
            env::set_var("BACKEND_INPUT_FORMAT", "ulaw");
            env::set_var("MAX_CONCURRENT_CALLS", "25");
            env::set_var("OPENAI_TRANSCRIPTION_MODEL", "");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.voice, OpenAIRealtimeVoice::Sage);
        assert_eq!(
            config.backend_input_format,
            OpenAIRealtimeAudioFormat::G711Ulaw
        );
        assert_eq!(config.max_concurrent_calls, Some(25));
        assert!(config.transcription_model.is_none());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "not-a-port");
        }

        let result = ServerConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_unknown_input_format() {
        cleanup_env_vars();
        unsafe {
            env::set_var("BACKEND_INPUT_FORMAT", "opus");
        }

        assert!(ServerConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

openai:
  api_key: "sk-yaml"
  voice: "verse"
  temperature: 0.9
  input_audio_format: "g711_ulaw"

calls:
  idle_timeout_secs: 120
  max_concurrent_calls: 3
"#;

        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-yaml"));
        assert_eq!(config.voice, OpenAIRealtimeVoice::Verse);
        assert_eq!(config.temperature, 0.9);
        assert_eq!(
            config.backend_input_format,
            OpenAIRealtimeAudioFormat::G711Ulaw
        );
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.session_ready_timeout_secs, 15);
        assert_eq!(config.max_concurrent_calls, Some(3));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_env_overrides_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "server:\n  port: 8080\nopenai:\n  model: \"yaml-model\"\n",
        )
        .unwrap();

        unsafe {
            env::set_var("PORT", "9090");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.model, "yaml-model");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();
        let result = ServerConfig::from_file(Path::new("/nonexistent/callbridge.yaml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_bad_voice() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "openai:\n  voice: \"robot\"\n").unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "openai.voice",
                ..
            })
        ));
    }
}
