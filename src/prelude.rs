//! Convenient re-exports for common pagehook types.
pub use crate::{
    clock::{Clock, ManualClock, SystemClock},
    config::PagehookConfig,
    context::{RequestContext, Response, SharedSettings},
    cookies::{CookieJar, CookieOptions, SameSite},
    dynamic::DynamicConfig,
    error::{BoxError, ConfigError, FeedbackError, PipelineError},
    feedback::{FeedbackEmail, FeedbackKind, FeedbackService, FeedbackSubmission, Mailer},
    hooks::{ColorScheme, ColorSchemeHook, ColorSchemeOptions, RefererHook, Transform},
    pipeline::{
        compose, hook_fn, resolver_fn, Hook, Next, Pipeline, PipelineLayer, ResolveOptions,
        Resolver, Sequence, ServiceResolver,
    },
    rate_limit::{
        client_key, FixedWindowLimiter, InMemoryWindowStore, RateLimitConfig, RateLimitHook,
        RateLimitResult, Sweeper, WindowStore,
    },
};
