//! Crate-wide settings loaded from JSON or the environment.

use crate::error::ConfigError;
use crate::hooks::{ColorSchemeOptions, Transform};
use crate::rate_limit::{RateLimitConfig, DEFAULT_SWEEP_INTERVAL};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_COLOR_SCHEME_COOKIE: &str = "PAGEHOOK_COLOR_SCHEME_COOKIE";
pub const ENV_BUILDING: &str = "PAGEHOOK_BUILDING";
pub const ENV_FEEDBACK_MAX_REQUESTS: &str = "PAGEHOOK_FEEDBACK_MAX_REQUESTS";
pub const ENV_FEEDBACK_WINDOW_MS: &str = "PAGEHOOK_FEEDBACK_WINDOW_MS";
pub const ENV_SWEEP_INTERVAL_MS: &str = "PAGEHOOK_SWEEP_INTERVAL_MS";

/// Settings for the hooks, the feedback limiter and its sweeper.
///
/// Every field has a default, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagehookConfig {
    #[serde(default)]
    pub color_scheme: ColorSchemeOptions,
    #[serde(default)]
    pub feedback_limit: RateLimitConfig,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_millis() as u64
}

impl Default for PagehookConfig {
    fn default() -> Self {
        Self {
            color_scheme: ColorSchemeOptions::default(),
            feedback_limit: RateLimitConfig::default(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl PagehookConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigError::Parse { key: "json".into(), message: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the `PAGEHOOK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`PagehookConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(cookie) = lookup(ENV_COLOR_SCHEME_COOKIE).filter(|c| !c.trim().is_empty()) {
            config.color_scheme.cookie_name = cookie.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_BUILDING) {
            config.color_scheme.building = parse_flag(ENV_BUILDING, &raw)?;
        }

        let max_requests = match lookup(ENV_FEEDBACK_MAX_REQUESTS) {
            Some(raw) => parse(ENV_FEEDBACK_MAX_REQUESTS, &raw)?,
            None => config.feedback_limit.max_requests(),
        };
        let window_ms = match lookup(ENV_FEEDBACK_WINDOW_MS) {
            Some(raw) => parse(ENV_FEEDBACK_WINDOW_MS, &raw)?,
            None => config.feedback_limit.window_ms(),
        };
        config.feedback_limit = RateLimitConfig::new(max_requests, window_ms)?;

        if let Some(raw) = lookup(ENV_SWEEP_INTERVAL_MS) {
            config.sweep_interval_ms = parse(ENV_SWEEP_INTERVAL_MS, &raw)?;
        }

        config.validate()?;
        tracing::debug!(?config, "loaded configuration from environment");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.color_scheme.validate()?;
        let limit = &self.feedback_limit;
        if limit.max_requests() == 0 || limit.window_ms() == 0 {
            return Err(ConfigError::InvalidRateLimit {
                max_requests: limit.max_requests(),
                window_ms: limit.window_ms(),
            });
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidSweepInterval);
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Whether the color scheme hook rewrites HTML at all.
    pub fn transforms_html(&self) -> bool {
        !matches!(self.color_scheme.transform, Transform::Enabled(false))
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Parse { key: key.to_string(), message: e.to_string() })
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Parse {
            key: key.to_string(),
            message: format!("expected a boolean, got `{other}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_json_is_all_defaults() {
        let config = PagehookConfig::from_json("{}").unwrap();
        assert_eq!(config, PagehookConfig::default());
        assert_eq!(config.color_scheme.cookie_name, "blog-color-scheme");
        assert_eq!(config.feedback_limit.max_requests(), 5);
        assert_eq!(config.feedback_limit.window_ms(), 3_600_000);
        assert_eq!(config.sweep_interval(), Duration::from_secs(600));
    }

    #[test]
    fn json_accepts_placeholder_or_flag() {
        let config = PagehookConfig::from_json(
            r#"{"color_scheme":{"cookie_name":"cs","transform":"%theme%"},"feedback_limit":{"max_requests":3}}"#,
        )
        .unwrap();
        assert_eq!(config.color_scheme.transform, Transform::Placeholder("%theme%".into()));
        assert_eq!(config.feedback_limit.max_requests(), 3);
        assert_eq!(config.feedback_limit.window_ms(), 3_600_000);

        let off = PagehookConfig::from_json(r#"{"color_scheme":{"transform":false}}"#).unwrap();
        assert!(!off.transforms_html());
    }

    #[test]
    fn json_rejects_zero_limits() {
        let err = PagehookConfig::from_json(r#"{"feedback_limit":{"max_requests":0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err:?}");
        let err = PagehookConfig::from_json(r#"{"sweep_interval_ms":0}"#).unwrap_err();
        assert_eq!(err, ConfigError::InvalidSweepInterval);
    }

    #[test]
    fn rejects_cookie_names_that_cannot_be_sent() {
        for name in ["bad\\nname", "theme=x", ""] {
            let json = format!(r#"{{"color_scheme":{{"cookie_name":"{name}"}}}}"#);
            let err = PagehookConfig::from_json(&json).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidCookieName { .. }), "{name:?}: {err:?}");
        }

        let err = PagehookConfig::from_lookup(lookup(&[(ENV_COLOR_SCHEME_COOKIE, "a;b")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidCookieName { name: "a;b".into() });
    }

    #[test]
    fn env_overrides_defaults() {
        let config = PagehookConfig::from_lookup(lookup(&[
            (ENV_COLOR_SCHEME_COOKIE, "cs"),
            (ENV_BUILDING, "true"),
            (ENV_FEEDBACK_MAX_REQUESTS, " 10 "),
            (ENV_SWEEP_INTERVAL_MS, "1000"),
        ]))
        .unwrap();
        assert_eq!(config.color_scheme.cookie_name, "cs");
        assert!(config.color_scheme.building);
        assert_eq!(config.feedback_limit.max_requests(), 10);
        assert_eq!(config.feedback_limit.window_ms(), 3_600_000);
        assert_eq!(config.sweep_interval_ms, 1_000);
    }

    #[test]
    fn env_reports_bad_values() {
        let err = PagehookConfig::from_lookup(lookup(&[(ENV_FEEDBACK_WINDOW_MS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref key, .. } if key == ENV_FEEDBACK_WINDOW_MS));

        let err = PagehookConfig::from_lookup(lookup(&[(ENV_FEEDBACK_MAX_REQUESTS, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::InvalidRateLimit { max_requests: 0, window_ms: 3_600_000 });

        let err = PagehookConfig::from_lookup(lookup(&[(ENV_BUILDING, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
