//! Referer tracking for internal navigation.

use crate::context::{RequestContext, Response};
use crate::error::BoxError;
use crate::pipeline::{Hook, Next};
use async_trait::async_trait;
use http::header::REFERER;
use url::Url;

/// Stores the `Referer` on the context when it shares the request's origin.
///
/// Cross-origin and unparseable referers are ignored. The hook never
/// short-circuits and passes the response through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefererHook;

impl RefererHook {
    pub fn new() -> Self {
        Self
    }

    /// Parse the request's `Referer`, keeping it only if same-origin.
    pub fn internal_referer(ctx: &RequestContext) -> Option<Url> {
        let raw = ctx.header(REFERER.as_str())?;
        match Url::parse(raw) {
            Ok(referer) if referer.origin() == ctx.url().origin() => Some(referer),
            Ok(referer) => {
                tracing::debug!(referer = %referer, "ignoring cross-origin referer");
                None
            }
            Err(error) => {
                tracing::debug!(%error, "ignoring unparseable referer");
                None
            }
        }
    }
}

#[async_trait]
impl Hook for RefererHook {
    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response, BoxError> {
        if let Some(referer) = Self::internal_referer(ctx) {
            ctx.referer = Some(referer);
        }
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::resolver_fn;
    use http::header::{HeaderMap, HeaderValue};

    fn ctx_with_referer(referer: &'static str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static(referer));
        RequestContext::new("https://blog.example/blog/post".parse().unwrap()).with_headers(headers)
    }

    async fn run(ctx: &mut RequestContext) -> Response {
        let resolver = resolver_fn(|_| Ok(Response::new("page".to_string())));
        RefererHook::new().handle(ctx, Next::terminal(&resolver)).await.unwrap()
    }

    #[tokio::test]
    async fn keeps_same_origin_referer() {
        let mut ctx = ctx_with_referer("https://blog.example/blog?page=2");
        let response = run(&mut ctx).await;
        assert_eq!(response.body(), "page");
        assert_eq!(ctx.referer.unwrap().as_str(), "https://blog.example/blog?page=2");
    }

    #[tokio::test]
    async fn drops_other_origins() {
        for referer in [
            "https://elsewhere.example/",
            "http://blog.example/",
            "https://blog.example:8443/",
        ] {
            let mut ctx = ctx_with_referer(referer);
            run(&mut ctx).await;
            assert!(ctx.referer.is_none(), "{referer} should be ignored");
        }
    }

    #[tokio::test]
    async fn malformed_referer_does_not_abort_chain() {
        let mut ctx = ctx_with_referer("not a url");
        let response = run(&mut ctx).await;
        assert_eq!(response.body(), "page");
        assert!(ctx.referer.is_none());
    }

    #[tokio::test]
    async fn missing_referer_is_fine() {
        let mut ctx = RequestContext::new("https://blog.example/".parse().unwrap());
        run(&mut ctx).await;
        assert!(ctx.referer.is_none());
    }
}
