#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # pagehook
//!
//! Composable request hooks for server-rendered sites, plus the fixed-window
//! rate limiter behind the reader feedback form.
//!
//! ## Features
//!
//! - **Hook pipeline**: ordered interceptors with a `next` continuation,
//!   composed with [`compose`] and driven as a `tower::Service`
//! - **Referer tracking**: same-origin `Referer` kept on the context
//! - **Color scheme**: query / cookie preference resolution, a persisted
//!   cookie and HTML placeholder rewriting
//! - **Rate limiting**: per-key fixed windows with an injectable clock,
//!   a background sweeper and a `429` hook
//! - **Feedback submission**: throttled hand-off to a [`Mailer`]
//!
//! ## Quick Start
//!
//! ```rust
//! use pagehook::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), BoxError> {
//! let pipeline = compose([
//!     Arc::new(RefererHook::new()) as Arc<dyn Hook>,
//!     Arc::new(ColorSchemeHook::new(ColorSchemeOptions::new("cs"))),
//! ])
//! .resolve_with(resolver_fn(|ctx| {
//!     let class = ctx.shared_settings.color_scheme.render_class();
//!     Ok(http::Response::new(format!("<html class=\"{class}\" data-theme=\"%color-scheme%\">")))
//! }));
//!
//! let ctx = RequestContext::new("https://blog.example/?color-scheme=dark".parse()?);
//! let response = pipeline.handle(ctx).await?;
//! assert_eq!(response.body(), "<html class=\"dark\" data-theme=\"dark\">");
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod cookies;
pub mod dynamic;
pub mod error;
pub mod feedback;
pub mod hooks;
pub mod pipeline;
pub mod prelude;
pub mod rate_limit;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PagehookConfig;
pub use context::{RequestContext, Response, SharedSettings};
pub use cookies::{Cookie, CookieJar, CookieOptions, SameSite};
pub use dynamic::DynamicConfig;
pub use error::{BoxError, ConfigError, FeedbackError, PipelineError};
pub use feedback::{FeedbackService, Mailer};
pub use hooks::{ColorScheme, ColorSchemeHook, ColorSchemeOptions, RefererHook, Transform};
pub use pipeline::{compose, Hook, Next, Pipeline, PipelineLayer, Resolver, Sequence};
pub use rate_limit::{FixedWindowLimiter, RateLimitConfig, RateLimitHook, RateLimitResult, Sweeper};
