//! Reader feedback submission.
//!
//! [`FeedbackService::submit`] is the call site that consults the rate
//! limiter before handing a submission to a [`Mailer`]. Rendering and
//! transport of the email live behind the `Mailer` trait.

use crate::clock::{Clock, SystemClock};
use crate::dynamic::DynamicConfig;
use crate::error::{BoxError, FeedbackError};
use crate::rate_limit::{
    client_key, retry_message, FixedWindowLimiter, InMemoryWindowStore, RateLimitConfig,
    RateLimitResult, WindowStore,
};
use async_trait::async_trait;
use http::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// User-facing message for a throttled submission.
///
/// ```
/// use pagehook::feedback::throttle_message;
///
/// assert_eq!(
///     throttle_message(1),
///     "Too many feedback submissions. Please try again in 1 minute."
/// );
/// ```
pub fn throttle_message(minutes: u64) -> String {
    format!("Too many feedback submissions. {}", retry_message(minutes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        })
    }
}

/// A feedback form as posted by a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    #[serde(rename = "feedbackType")]
    pub kind: FeedbackKind,
    pub post_title: String,
    pub post_slug: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub message: String,
}

/// What the [`Mailer`] receives for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEmail {
    pub kind: FeedbackKind,
    pub post_title: String,
    pub post_slug: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: String,
    /// Absolute URL of the post, `{base_url}/blog/{slug}`.
    pub post_url: String,
}

/// Delivers accepted feedback.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_feedback(&self, email: FeedbackEmail) -> Result<(), BoxError>;
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for Arc<M> {
    async fn send_feedback(&self, email: FeedbackEmail) -> Result<(), BoxError> {
        (**self).send_feedback(email).await
    }
}

/// Throttled feedback submission.
///
/// The quota is read from a [`DynamicConfig`] on every submission, so it
/// can be tightened while the service runs.
pub struct FeedbackService<M, C = SystemClock, S = InMemoryWindowStore> {
    limiter: Arc<FixedWindowLimiter<C, S>>,
    config: DynamicConfig<RateLimitConfig>,
    mailer: M,
}

impl<M, C, S> fmt::Debug for FeedbackService<M, C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackService").field("config", &*self.config.get()).finish_non_exhaustive()
    }
}

impl<M, C, S> FeedbackService<M, C, S>
where
    M: Mailer,
    C: Clock,
    S: WindowStore,
{
    pub fn new(
        limiter: Arc<FixedWindowLimiter<C, S>>,
        config: DynamicConfig<RateLimitConfig>,
        mailer: M,
    ) -> Self {
        Self { limiter, config, mailer }
    }

    pub fn config(&self) -> &DynamicConfig<RateLimitConfig> {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<FixedWindowLimiter<C, S>> {
        &self.limiter
    }

    /// Validate, throttle and forward one submission.
    ///
    /// Empty messages are rejected before the limiter is consulted, so they
    /// do not use up the client's quota. Returns the limiter's verdict for
    /// the accepted request.
    pub async fn submit(
        &self,
        headers: &HeaderMap,
        submission: FeedbackSubmission,
        base_url: &str,
    ) -> Result<RateLimitResult, FeedbackError> {
        if submission.message.trim().is_empty() {
            return Err(FeedbackError::EmptyMessage);
        }

        let key = client_key(headers);
        let config = self.config.get();
        let result = self.limiter.check(&key, &config);
        if !result.allowed {
            let retry_after_minutes = result.retry_after_minutes(self.limiter.now_millis());
            return Err(FeedbackError::Throttled { retry_after_minutes });
        }

        let email = FeedbackEmail {
            post_url: post_url(base_url, &submission.post_slug),
            kind: submission.kind,
            post_title: submission.post_title,
            post_slug: submission.post_slug,
            name: submission.name.filter(|n| !n.trim().is_empty()),
            email: submission.email.filter(|e| !e.trim().is_empty()),
            message: submission.message,
        };
        let slug = email.post_slug.clone();
        let kind = email.kind;

        match self.mailer.send_feedback(email).await {
            Ok(()) => {
                tracing::info!(%kind, post = %slug, remaining = result.remaining, "feedback delivered");
                Ok(result)
            }
            Err(error) => {
                tracing::error!(%kind, post = %slug, %error, "feedback delivery failed");
                Err(FeedbackError::Delivery(error))
            }
        }
    }
}

fn post_url(base_url: &str, slug: &str) -> String {
    format!("{}/blog/{}", base_url.trim_end_matches('/'), slug)
}
