//! Configuration module for the voice bridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voice_bridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::bridge::BridgeSettings;
use crate::core::lifecycle::LifecycleConfig;
use crate::core::realtime::TurnDetectionConfig;
use crate::core::realtime::openai::{DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_URL};
use crate::core::session::{DEFAULT_PROMPT, SessionDefaults};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_REALTIME_MODEL: &str = crate::core::realtime::openai::DEFAULT_REALTIME_MODEL;
pub const DEFAULT_REALTIME_VOICE: &str = "alloy";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_VAD_THRESHOLD: f32 = 0.5;
pub const DEFAULT_VAD_PREFIX_PADDING_MS: u32 = 300;
pub const DEFAULT_VAD_SILENCE_DURATION_MS: u32 = 500;
pub const DEFAULT_SESSION_GRACE_PERIOD_SECONDS: u64 = 60;
pub const DEFAULT_SESSION_MAX_AGE_SECONDS: u64 = 2 * 60 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 5 * 60;
pub const DEFAULT_RESULTS_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
pub const DEFAULT_RATE_LIMIT_BURST_SIZE: u32 = 10;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the bridge:
/// - Server settings (host, port, TLS, public URL)
/// - Realtime AI leg settings (API key, endpoint, model, voice, VAD)
/// - Session defaults and eviction timing
/// - Results collector
/// - Security settings (CORS, rate limiting)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// Externally reachable base URL used in stream instructions. When unset,
    /// the request's Host header is used.
    pub public_url: Option<String>,

    // Realtime AI leg
    pub openai_api_key: Option<String>,
    pub realtime_url: String,
    pub realtime_model: String,
    /// Voice for sessions that do not name one
    pub realtime_voice: String,
    pub transcription_model: String,
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,

    // Sessions
    pub default_prompt: String,
    pub default_language: String,
    pub session_grace_period_seconds: u64,
    pub session_max_age_seconds: u64,
    pub sweep_interval_seconds: u64,

    // Results collector
    pub results_url: Option<String>,
    pub results_timeout_seconds: u64,

    // Security
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            public_url: None,
            openai_api_key: None,
            realtime_url: OPENAI_REALTIME_URL.to_string(),
            realtime_model: DEFAULT_REALTIME_MODEL.to_string(),
            realtime_voice: DEFAULT_REALTIME_VOICE.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            vad_threshold: DEFAULT_VAD_THRESHOLD,
            vad_prefix_padding_ms: DEFAULT_VAD_PREFIX_PADDING_MS,
            vad_silence_duration_ms: DEFAULT_VAD_SILENCE_DURATION_MS,
            default_prompt: DEFAULT_PROMPT.to_string(),
            default_language: DEFAULT_LANGUAGE.to_string(),
            session_grace_period_seconds: DEFAULT_SESSION_GRACE_PERIOD_SECONDS,
            session_max_age_seconds: DEFAULT_SESSION_MAX_AGE_SECONDS,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            results_url: None,
            results_timeout_seconds: DEFAULT_RESULTS_TIMEOUT_SECONDS,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst_size: DEFAULT_RATE_LIMIT_BURST_SIZE,
        }
    }
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

impl ServerConfig {
    /// Load configuration from environment variables (and defaults).
    ///
    /// `.env` is loaded by `main` before this runs.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the YAML file cannot be read or is malformed, an
    /// environment variable does not parse, or validation fails.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_urls(self)?;
        validation::validate_intervals(self)?;
        validation::validate_vad(self)?;
        validation::validate_rate_limit(self)?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Defaults applied to newly created sessions.
    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults {
            prompt: self.default_prompt.clone(),
            language: self.default_language.clone(),
        }
    }

    /// Eviction timing for the lifecycle manager.
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            grace_period: Duration::from_secs(self.session_grace_period_seconds),
            max_age: Duration::from_secs(self.session_max_age_seconds),
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
        }
    }

    pub fn results_timeout(&self) -> Duration {
        Duration::from_secs(self.results_timeout_seconds)
    }

    /// Parameters for opening AI legs.
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            api_key: self.openai_api_key.clone(),
            realtime_url: self.realtime_url.clone(),
            model: self.realtime_model.clone(),
            voice: self.realtime_voice.clone(),
            transcription_model: self.transcription_model.clone(),
            turn_detection: TurnDetectionConfig::ServerVad {
                threshold: Some(self.vad_threshold),
                prefix_padding_ms: Some(self.vad_prefix_padding_ms),
                silence_duration_ms: Some(self.vad_silence_duration_ms),
            },
        }
    }
}
