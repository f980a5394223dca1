//! Environment variable access.
//!
//! Blank values are treated as unset so `KEY=` in a `.env` file does not
//! override a YAML value or a default.

use std::env;
use std::str::FromStr;

/// Read a variable, trimming whitespace. Empty values count as unset.
pub(super) fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read and parse a variable.
///
/// Unset yields `Ok(None)`; a value that does not parse is an error naming
/// the variable.
pub(super) fn env_parse<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key} ({raw:?}): {e}")),
    }
}
