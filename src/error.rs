//! Error types for the hook pipeline, configuration and feedback submission.
use std::error::Error as StdError;

/// Type-erased error flowing through hooks and resolvers.
///
/// Hooks propagate whatever `next` returns unchanged; the host framework's
/// top-level handler decides what to show.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by the pipeline itself while assembling a response.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A cookie could not be encoded into a `Set-Cookie` header value.
    #[error("invalid header value for cookie `{name}`")]
    InvalidHeader {
        /// Cookie name.
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    /// A cookie name is empty or contains characters outside an RFC 6265 token.
    #[error("invalid cookie name {name:?}")]
    InvalidCookieName { name: String },
}

/// Errors produced when validating or loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `max_requests` and `window_ms` must both be > 0.
    #[error("rate limit requires max_requests > 0 and window_ms > 0 (got {max_requests} per {window_ms}ms)")]
    InvalidRateLimit { max_requests: u32, window_ms: u64 },
    /// Cookie names must be non-empty RFC 6265 tokens.
    #[error("invalid cookie name {name:?}")]
    InvalidCookieName { name: String },
    /// Sweep interval must be > 0.
    #[error("sweep interval must be > 0")]
    InvalidSweepInterval,
    /// A configuration value could not be parsed.
    #[error("failed to parse `{key}`: {message}")]
    Parse { key: String, message: String },
}

/// Errors returned to a reader submitting feedback.
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    /// The client exceeded the submission quota for the current window.
    #[error("{}", crate::feedback::throttle_message(*retry_after_minutes))]
    Throttled {
        /// Whole minutes until the window resets, rounded up.
        retry_after_minutes: u64,
    },
    /// The message body was empty after trimming.
    #[error("feedback message must not be empty")]
    EmptyMessage,
    /// The mail collaborator failed to deliver.
    #[error("failed to deliver feedback: {0}")]
    Delivery(#[source] BoxError),
}

impl FeedbackError {
    /// Check if this error is due to throttling.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Minutes until the caller may retry, if throttled.
    pub fn retry_after_minutes(&self) -> Option<u64> {
        match self {
            Self::Throttled { retry_after_minutes } => Some(*retry_after_minutes),
            _ => None,
        }
    }
}
