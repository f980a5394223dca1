//! URL validation for configured endpoints
//!
//! Used at config load for the results collector URL, the public base URL
//! handed to the telephony provider, and the realtime endpoint. A URL is
//! accepted when it parses, carries one of the allowed schemes and has a host.
//! Results URLs pointing at private or loopback addresses are accepted with a
//! warning, since a collector on the same host is a normal deployment.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::warn;
use url::{Host, Url};

/// Schemes accepted for plain HTTP endpoints.
pub const HTTP_SCHEMES: &[&str] = &["http", "https"];

/// Schemes accepted for WebSocket endpoints.
pub const WS_SCHEMES: &[&str] = &["ws", "wss"];

/// Errors that can occur during URL validation
#[derive(Debug, Error)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be one of {allowed:?}, got: {scheme}")]
    UnsupportedScheme {
        scheme: String,
        allowed: &'static [&'static str],
    },

    #[error("URL must have a host")]
    MissingHost,
}

/// Checks if an IPv4 address is loopback, private, link-local or unspecified.
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    if ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified() {
        return true;
    }
    // CGNAT 100.64.0.0/10
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0xC0) == 64
}

/// Checks if an IPv6 address is loopback, unique-local, link-local or maps to
/// a private IPv4 address.
pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();
    // fe80::/10 and fc00::/7
    if segments[0] & 0xFFC0 == 0xFE80 || segments[0] & 0xFE00 == 0xFC00 {
        return true;
    }
    ip.to_ipv4_mapped().is_some_and(|v4| is_private_ipv4(&v4))
}

/// Checks if an IP address is private/internal
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => is_private_ipv6(ipv6),
    }
}

/// Parse `raw` and check its scheme and host.
pub fn validate_url(raw: &str, allowed: &'static [&'static str]) -> Result<Url, UrlValidationError> {
    let url = Url::parse(raw.trim())?;

    if !allowed.contains(&url.scheme()) {
        return Err(UrlValidationError::UnsupportedScheme {
            scheme: url.scheme().to_string(),
            allowed,
        });
    }

    match url.host() {
        None => Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) if domain.is_empty() => Err(UrlValidationError::MissingHost),
        Some(_) => Ok(url),
    }
}

/// Validate the results collector URL. Private targets only warn.
pub fn validate_results_url(raw: &str) -> Result<Url, UrlValidationError> {
    let url = validate_url(raw, HTTP_SCHEMES)?;

    let private = match url.host() {
        Some(Host::Ipv4(ip)) => is_private_ipv4(&ip),
        Some(Host::Ipv6(ip)) => is_private_ipv6(&ip),
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        None => false,
    };
    if private {
        warn!(url = %url, "Results URL targets a private or loopback address");
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ipv4_ranges() {
        for ip in ["127.0.0.1", "10.1.2.3", "172.16.0.1", "192.168.1.1", "169.254.0.1", "0.0.0.0", "100.64.0.1"] {
            let ip: Ipv4Addr = ip.parse().unwrap();
            assert!(is_private_ipv4(&ip), "{ip} should be private");
        }
        for ip in ["8.8.8.8", "1.1.1.1", "100.128.0.1"] {
            let ip: Ipv4Addr = ip.parse().unwrap();
            assert!(!is_private_ipv4(&ip), "{ip} should be public");
        }
    }

    #[test]
    fn test_private_ipv6_ranges() {
        for ip in ["::1", "::", "fe80::1", "fd00::1", "::ffff:192.168.1.1"] {
            let ip: Ipv6Addr = ip.parse().unwrap();
            assert!(is_private_ipv6(&ip), "{ip} should be private");
        }
        let public: Ipv6Addr = "2607:f8b0:4004:800::200e".parse().unwrap();
        assert!(!is_private_ipv6(&public));
        assert!(is_private_ip(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn test_validate_url_accepts_allowed_schemes() {
        let url = validate_url("https://collector.example.com/results", HTTP_SCHEMES).unwrap();
        assert_eq!(url.host_str(), Some("collector.example.com"));
        assert!(validate_url("wss://api.openai.com/v1/realtime", WS_SCHEMES).is_ok());
        assert!(validate_url("  http://localhost:8080/x  ", HTTP_SCHEMES).is_ok());
    }

    #[test]
    fn test_validate_url_rejects_bad_input() {
        assert!(matches!(
            validate_url("not a url", HTTP_SCHEMES),
            Err(UrlValidationError::InvalidFormat(_))
        ));
        assert!(matches!(
            validate_url("ftp://example.com/file", HTTP_SCHEMES),
            Err(UrlValidationError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            validate_url("https://example.com", WS_SCHEMES),
            Err(UrlValidationError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            validate_url("unix:/run/socket", &["unix"]),
            Err(UrlValidationError::MissingHost)
        ));
    }

    #[test]
    fn test_results_url_allows_private_targets() {
        assert!(validate_results_url("http://127.0.0.1:9000/hook").is_ok());
        assert!(validate_results_url("http://localhost/hook").is_ok());
        assert!(validate_results_url("ws://example.com").is_err());
    }
}
