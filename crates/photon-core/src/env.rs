//! Environment variable helpers
//!
//! Every `PHOTON_*` knob goes through these so that a malformed value
//! silently falls back to the compiled-in default instead of aborting
//! startup.
//!
//! ```ignore
//! use photon_core::env::{env_get, env_get_bool};
//!
//! let port: u16 = env_get("PHOTON_PORT", 12345);
//! let flush = env_get_bool("PHOTON_LOG_FLUSH", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, or return `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Read `key` as a boolean.
///
/// `"1"`, `"true"`, `"yes"` and `"on"` (any case) are true, any other value
/// is false. Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_bool(&val),
        Err(_) => default,
    }
}

/// `Some(T)` when `key` is set and parses, `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Raw string value of `key`, or `default`.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Whether `key` is set at all (even to an empty string).
#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

pub(crate) fn parse_bool(val: &str) -> bool {
    matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
