use super::fixed_window::FixedWindowLimiter;
use super::store::{InMemoryWindowStore, WindowStore};
use super::{client_key, retry_message, RateLimitConfig};
use crate::clock::{Clock, SystemClock};
use crate::context::{RequestContext, Response};
use crate::dynamic::DynamicConfig;
use crate::error::BoxError;
use crate::pipeline::{Hook, Next};
use async_trait::async_trait;
use http::header::{HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::StatusCode;
use std::fmt;
use std::sync::Arc;

/// Header reporting the requests left in the current window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

type Matcher = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// A hook that throttles matching requests using a [`FixedWindowLimiter`].
///
/// Requests are keyed by `scope` plus the [`client_key`] of the request,
/// so hooks guarding different routes keep separate counts on a shared
/// limiter. Throttled requests get `429 Too Many Requests` with a
/// `Retry-After` in seconds and never reach `next`.
pub struct RateLimitHook<C = SystemClock, S = InMemoryWindowStore> {
    limiter: Arc<FixedWindowLimiter<C, S>>,
    config: DynamicConfig<RateLimitConfig>,
    scope: String,
    matcher: Matcher,
}

impl<C, S> fmt::Debug for RateLimitHook<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitHook")
            .field("scope", &self.scope)
            .field("config", &*self.config.get())
            .finish()
    }
}

impl<C, S> RateLimitHook<C, S>
where
    C: Clock,
    S: WindowStore,
{
    /// Throttle every request under `scope`.
    pub fn new(
        limiter: Arc<FixedWindowLimiter<C, S>>,
        scope: impl Into<String>,
        config: DynamicConfig<RateLimitConfig>,
    ) -> Self {
        Self { limiter, config, scope: scope.into(), matcher: Arc::new(|_| true) }
    }

    /// Only count requests for which `matcher` returns true.
    pub fn only_when<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.matcher = Arc::new(matcher);
        self
    }

    fn key(&self, ctx: &RequestContext) -> String {
        format!("{}:{}", self.scope, client_key(ctx.headers()))
    }
}

#[async_trait]
impl<C, S> Hook for RateLimitHook<C, S>
where
    C: Clock,
    S: WindowStore,
{
    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response, BoxError> {
        if !(self.matcher)(ctx) {
            return next.run(ctx).await;
        }

        let key = self.key(ctx);
        let config = self.config.get();
        let result = self.limiter.check(&key, &config);

        if result.allowed {
            let mut response = next.run(ctx).await?;
            response.headers_mut().insert(REMAINING_HEADER, HeaderValue::from(result.remaining));
            return Ok(response);
        }

        let now = self.limiter.now_millis();
        let retry_after_secs = result.retry_after(now).as_millis().div_ceil(1_000) as u64;
        let body = format!("Too many requests. {}", retry_message(result.retry_after_minutes(now)));
        let response = http::Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .header(RETRY_AFTER, retry_after_secs)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(REMAINING_HEADER, 0u32)
            .body(body)?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::pipeline::resolver_fn;
    use http::header::HeaderMap;
    use http::Method;

    fn request(ip: &'static str, method: Method) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        RequestContext::new("https://blog.example/blog/post".parse().unwrap())
            .with_method(method)
            .with_headers(headers)
    }

    fn hook(clock: ManualClock) -> RateLimitHook<ManualClock> {
        let limiter = Arc::new(FixedWindowLimiter::with_clock(clock));
        let config = DynamicConfig::new(RateLimitConfig::new(2, 90_000).unwrap());
        RateLimitHook::new(limiter, "feedback", config).only_when(|ctx| *ctx.method() == Method::POST)
    }

    async fn call(hook: &RateLimitHook<ManualClock>, mut ctx: RequestContext) -> Response {
        let resolver = resolver_fn(|_| Ok(Response::new("sent".to_string())));
        hook.handle(&mut ctx, Next::terminal(&resolver)).await.unwrap()
    }

    #[tokio::test]
    async fn throttles_after_quota_with_retry_after() {
        let clock = ManualClock::new(0);
        let hook = hook(clock.clone());

        let first = call(&hook, request("1.1.1.1", Method::POST)).await;
        assert_eq!(first.headers()[REMAINING_HEADER], "1");
        call(&hook, request("1.1.1.1", Method::POST)).await;

        clock.advance(500);
        let throttled = call(&hook, request("1.1.1.1", Method::POST)).await;
        assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(throttled.headers()[RETRY_AFTER], "90");
        assert!(throttled.body().ends_with("Please try again in 2 minutes."));
    }

    #[tokio::test]
    async fn unmatched_requests_are_not_counted() {
        let clock = ManualClock::new(0);
        let hook = hook(clock);
        for _ in 0..5 {
            let response = call(&hook, request("1.1.1.1", Method::GET)).await;
            assert_eq!(response.body(), "sent");
            assert!(response.headers().get(REMAINING_HEADER).is_none());
        }
        assert!(hook.limiter.store().is_empty());
    }

    #[tokio::test]
    async fn config_changes_apply_live() {
        let clock = ManualClock::new(0);
        let hook = hook(clock);
        hook.config.set(RateLimitConfig::new(1, 90_000).unwrap());
        call(&hook, request("2.2.2.2", Method::POST)).await;
        let throttled = call(&hook, request("2.2.2.2", Method::POST)).await;
        assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
