//! Configuration validation run after env and YAML are merged.

use std::path::PathBuf;

use super::{ServerConfig, TlsConfig};
use crate::utils::url_validation::{WS_SCHEMES, validate_results_url, validate_url};

const PUBLIC_URL_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Both TLS paths or neither.
pub(super) fn validate_tls(
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
            cert_path,
            key_path,
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err("TLS certificate path is set but the key path is missing".into()),
        (None, Some(_)) => Err("TLS key path is set but the certificate path is missing".into()),
    }
}

/// Endpoint URLs must parse with the right scheme and a host.
pub(super) fn validate_urls(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(url) = config.results_url.as_deref() {
        validate_results_url(url).map_err(|e| format!("Invalid results URL: {e}"))?;
    }

    if let Some(url) = config.public_url.as_deref() {
        validate_url(url, PUBLIC_URL_SCHEMES).map_err(|e| format!("Invalid public URL: {e}"))?;
    }

    validate_url(&config.realtime_url, WS_SCHEMES)
        .map_err(|e| format!("Invalid realtime URL: {e}"))?;

    Ok(())
}

/// Grace period, max age and sweep interval must be positive.
pub(super) fn validate_intervals(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    for (name, value) in [
        ("session grace period", config.session_grace_period_seconds),
        ("session max age", config.session_max_age_seconds),
        ("sweep interval", config.sweep_interval_seconds),
        ("results timeout", config.results_timeout_seconds),
    ] {
        if value == 0 {
            return Err(format!("{name} must be greater than zero").into());
        }
    }
    Ok(())
}

pub(super) fn validate_vad(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&config.vad_threshold) {
        return Err(format!(
            "VAD threshold must be between 0.0 and 1.0, got {}",
            config.vad_threshold
        )
        .into());
    }
    Ok(())
}

pub(super) fn validate_rate_limit(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err("Rate limit values must be greater than zero".into());
    }
    Ok(())
}
