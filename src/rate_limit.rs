//! Rate limiting primitives.
//!
//! This module provides the building blocks for rate limiting:
//! - [`FixedWindowLimiter`]: per-key fixed-window counter; `check` is
//!   synchronous and never fails.
//! - [`WindowStore`]: where window entries live ([`InMemoryWindowStore`]
//!   by default).
//! - [`Sweeper`]: background task that drops expired entries.
//! - [`RateLimitHook`]: hook that throttles selected routes with `429`.
//!
//! # Fixed windows
//!
//! A key's first request opens a window of `window_ms`; up to
//! `max_requests` are accepted until it closes, after which the next
//! request opens a fresh window. Bursts straddling a window edge can see
//! up to twice the quota in just under two windows. That is accepted: the
//! limiter deters abuse, it does not meter.

use crate::error::ConfigError;
use http::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod fixed_window;
pub mod middleware;
pub mod store;
pub mod sweeper;

pub use fixed_window::FixedWindowLimiter;
pub use middleware::RateLimitHook;
pub use store::{InMemoryWindowStore, WindowStore};
pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};

/// Key used when no proxy header identifies the client.
pub const UNKNOWN_CLIENT: &str = "unknown";

const MILLIS_PER_MINUTE: u64 = 60_000;

/// Quota for one class of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRateLimitConfig")]
pub struct RateLimitConfig {
    max_requests: u32,
    window_ms: u64,
}

#[derive(Deserialize)]
struct RawRateLimitConfig {
    #[serde(default = "default_max_requests")]
    max_requests: u32,
    #[serde(default = "default_window_ms")]
    window_ms: u64,
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_ms() -> u64 {
    60 * MILLIS_PER_MINUTE
}

impl TryFrom<RawRateLimitConfig> for RateLimitConfig {
    type Error = ConfigError;

    fn try_from(raw: RawRateLimitConfig) -> Result<Self, Self::Error> {
        Self::new(raw.max_requests, raw.window_ms)
    }
}

impl Default for RateLimitConfig {
    /// Five requests per hour.
    fn default() -> Self {
        Self { max_requests: default_max_requests(), window_ms: default_window_ms() }
    }
}

impl RateLimitConfig {
    /// Both values must be > 0.
    pub fn new(max_requests: u32, window_ms: u64) -> Result<Self, ConfigError> {
        if max_requests == 0 || window_ms == 0 {
            return Err(ConfigError::InvalidRateLimit { max_requests, window_ms });
        }
        Ok(Self { max_requests, window_ms })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Window state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Requests accepted in the current window.
    pub count: u32,
    /// Epoch millis at which the window closes.
    pub reset_at: u64,
}

impl WindowEntry {
    /// Expired entries count as absent, swept or not.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis > self.reset_at
    }
}

/// Snapshot returned by a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Requests still accepted in this window.
    pub remaining: u32,
    /// Epoch millis at which the window closes.
    pub reset_at: u64,
}

impl RateLimitResult {
    /// Time until the window closes, measured from `now_millis`.
    pub fn retry_after(&self, now_millis: u64) -> Duration {
        Duration::from_millis(self.reset_at.saturating_sub(now_millis))
    }

    /// Whole minutes until the window closes, rounded up.
    pub fn retry_after_minutes(&self, now_millis: u64) -> u64 {
        retry_after_minutes(self.reset_at, now_millis)
    }
}

/// `ceil((reset_at - now) / 60000)`, never negative.
pub fn retry_after_minutes(reset_at: u64, now_millis: u64) -> u64 {
    reset_at.saturating_sub(now_millis).div_ceil(MILLIS_PER_MINUTE)
}

/// "Please try again in N minute(s)."
pub fn retry_message(minutes: u64) -> String {
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    format!("Please try again in {} {}.", minutes, unit)
}

/// Identify the client behind a trusted proxy.
///
/// Takes the first entry of `X-Forwarded-For`, else `X-Real-IP`, else
/// [`UNKNOWN_CLIENT`]. Headers are taken at face value; only use this
/// behind a proxy that overwrites them.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || header_str(headers, "x-real-ip").map(str::trim).filter(|v| !v.is_empty());

    forwarded.or_else(real_ip).unwrap_or(UNKNOWN_CLIENT).to_string()
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name)?.to_str().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn client_key_prefers_first_forwarded_entry() {
        let map = headers(&[("x-forwarded-for", "1.2.3.4, 5.6.7.8"), ("x-real-ip", "9.9.9.9")]);
        assert_eq!(client_key(&map), "1.2.3.4");
    }

    #[test]
    fn client_key_falls_back_to_real_ip_then_unknown() {
        assert_eq!(client_key(&headers(&[("x-real-ip", "  10.0.0.7 ")])), "10.0.0.7");
        assert_eq!(client_key(&HeaderMap::new()), "unknown");
        assert_eq!(client_key(&headers(&[("x-forwarded-for", " , 1.1.1.1")])), "unknown");
    }

    #[test]
    fn config_rejects_zero_values() {
        assert!(RateLimitConfig::new(0, 1_000).is_err());
        assert!(RateLimitConfig::new(1, 0).is_err());
        let cfg = RateLimitConfig::new(5, 3_600_000).unwrap();
        assert_eq!(cfg.window(), Duration::from_secs(3_600));
    }

    #[test]
    fn config_deserializes_with_validation() {
        let cfg: RateLimitConfig = serde_json::from_str(r#"{"max_requests": 3}"#).unwrap();
        assert_eq!(cfg.max_requests(), 3);
        assert_eq!(cfg.window_ms(), 3_600_000);
        let err = serde_json::from_str::<RateLimitConfig>(r#"{"max_requests": 0}"#);
        assert!(err.is_err());
    }

    #[test]
    fn retry_minutes_round_up() {
        assert_eq!(retry_after_minutes(60_000, 0), 1);
        assert_eq!(retry_after_minutes(60_001, 0), 2);
        assert_eq!(retry_after_minutes(1, 0), 1);
        assert_eq!(retry_after_minutes(0, 5), 0);
    }

    #[test]
    fn retry_message_pluralizes() {
        assert_eq!(retry_message(1), "Please try again in 1 minute.");
        assert_eq!(retry_message(3), "Please try again in 3 minutes.");
        assert_eq!(retry_message(0), "Please try again in 0 minutes.");
    }
}
