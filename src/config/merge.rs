//! Merge environment variables with optional YAML overrides.
//!
//! Priority per field: YAML > environment > default.

use std::path::PathBuf;

use super::env::{env_parse, env_string};
use super::validation::validate_tls;
use super::yaml::YamlConfig;
use super::{
    DEFAULT_HOST, DEFAULT_LANGUAGE, DEFAULT_PORT, DEFAULT_RATE_LIMIT_BURST_SIZE,
    DEFAULT_RATE_LIMIT_RPS, DEFAULT_REALTIME_MODEL, DEFAULT_REALTIME_VOICE,
    DEFAULT_RESULTS_TIMEOUT_SECONDS, DEFAULT_SESSION_GRACE_PERIOD_SECONDS,
    DEFAULT_SESSION_MAX_AGE_SECONDS, DEFAULT_SWEEP_INTERVAL_SECONDS, DEFAULT_VAD_PREFIX_PADDING_MS,
    DEFAULT_VAD_SILENCE_DURATION_MS, DEFAULT_VAD_THRESHOLD, ServerConfig,
};
use crate::core::realtime::openai::{DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_URL};
use crate::core::session::DEFAULT_PROMPT;

pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let tls = server.tls.unwrap_or_default();
    let realtime = yaml.realtime.unwrap_or_default();
    let vad = realtime.vad.unwrap_or_default();
    let sessions = yaml.sessions.unwrap_or_default();
    let results = yaml.results.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let tls = validate_tls(
        tls.cert_path
            .or_else(|| env_string("TLS_CERT_PATH").map(PathBuf::from)),
        tls.key_path
            .or_else(|| env_string("TLS_KEY_PATH").map(PathBuf::from)),
    )?;

    Ok(ServerConfig {
        host: server
            .host
            .or_else(|| env_string("HOST"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: pick(server.port, env_parse("PORT")?, DEFAULT_PORT),
        tls,
        public_url: server.public_url.or_else(|| env_string("PUBLIC_URL")),

        openai_api_key: realtime.api_key.or_else(|| env_string("OPENAI_API_KEY")),
        realtime_url: realtime
            .url
            .or_else(|| env_string("OPENAI_REALTIME_URL"))
            .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
        realtime_model: realtime
            .model
            .or_else(|| env_string("OPENAI_REALTIME_MODEL"))
            .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
        realtime_voice: realtime
            .voice
            .or_else(|| env_string("OPENAI_REALTIME_VOICE"))
            .unwrap_or_else(|| DEFAULT_REALTIME_VOICE.to_string()),
        transcription_model: realtime
            .transcription_model
            .or_else(|| env_string("OPENAI_TRANSCRIPTION_MODEL"))
            .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
        vad_threshold: pick(vad.threshold, env_parse("VAD_THRESHOLD")?, DEFAULT_VAD_THRESHOLD),
        vad_prefix_padding_ms: pick(
            vad.prefix_padding_ms,
            env_parse("VAD_PREFIX_PADDING_MS")?,
            DEFAULT_VAD_PREFIX_PADDING_MS,
        ),
        vad_silence_duration_ms: pick(
            vad.silence_duration_ms,
            env_parse("VAD_SILENCE_DURATION_MS")?,
            DEFAULT_VAD_SILENCE_DURATION_MS,
        ),

        default_prompt: sessions
            .default_prompt
            .or_else(|| env_string("DEFAULT_PROMPT"))
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        default_language: sessions
            .default_language
            .or_else(|| env_string("DEFAULT_LANGUAGE"))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        session_grace_period_seconds: pick(
            sessions.grace_period_seconds,
            env_parse("SESSION_GRACE_PERIOD_SECONDS")?,
            DEFAULT_SESSION_GRACE_PERIOD_SECONDS,
        ),
        session_max_age_seconds: pick(
            sessions.max_age_seconds,
            env_parse("SESSION_MAX_AGE_SECONDS")?,
            DEFAULT_SESSION_MAX_AGE_SECONDS,
        ),
        sweep_interval_seconds: pick(
            sessions.sweep_interval_seconds,
            env_parse("SESSION_SWEEP_INTERVAL_SECONDS")?,
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        ),

        results_url: results.url.or_else(|| env_string("RESULTS_WEBHOOK_URL")),
        results_timeout_seconds: pick(
            results.timeout_seconds,
            env_parse("RESULTS_TIMEOUT_SECONDS")?,
            DEFAULT_RESULTS_TIMEOUT_SECONDS,
        ),

        cors_allowed_origins: security
            .cors_allowed_origins
            .or_else(|| env_string("CORS_ALLOWED_ORIGINS")),
        rate_limit_requests_per_second: pick(
            security.rate_limit_requests_per_second,
            env_parse("RATE_LIMIT_REQUESTS_PER_SECOND")?,
            DEFAULT_RATE_LIMIT_RPS,
        ),
        rate_limit_burst_size: pick(
            security.rate_limit_burst_size,
            env_parse("RATE_LIMIT_BURST_SIZE")?,
            DEFAULT_RATE_LIMIT_BURST_SIZE,
        ),
    })
}

fn pick<T>(yaml: Option<T>, env: Option<T>, default: T) -> T {
    yaml.or(env).unwrap_or(default)
}
