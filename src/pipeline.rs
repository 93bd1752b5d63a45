//! Hook pipeline: ordered request interceptors over a shared context.
//!
//! A [`Hook`] receives the request context and a [`Next`] handle. It can
//! continue the chain with [`Next::run`], short-circuit by returning its
//! own response, or post-process what `next` returned. [`compose`] turns
//! an ordered list of hooks into a [`Sequence`], itself a hook, and a
//! sequence plus a terminal [`Resolver`] is a [`Pipeline`]: a
//! `tower::Service<RequestContext>`.
//!
//! ```
//! use pagehook::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), BoxError> {
//! let pipeline = compose([
//!     Arc::new(RefererHook::new()) as Arc<dyn Hook>,
//!     Arc::new(ColorSchemeHook::new(ColorSchemeOptions::new("cs"))),
//! ])
//! .resolve_with(resolver_fn(|_ctx| {
//!     Ok(http::Response::new("<body class=\"%color-scheme%\"></body>".to_string()))
//! }));
//!
//! let ctx = RequestContext::new("https://blog.example/".parse()?);
//! let response = pipeline.handle(ctx).await?;
//! assert_eq!(response.body(), "<body class=\"light\"></body>");
//! # Ok(())
//! # }
//! ```
//!
//! # Ordering
//!
//! "Before" logic runs in declaration order, "after" logic in reverse:
//! `[A, B]` runs `A-before, B-before, resolver, B-after, A-after`.
//!
//! HTML transforms handed to [`Next::run_with`] accumulate along the chain
//! and are applied by the resolver, outermost hook's transform first.

use crate::context::{RequestContext, Response};
use crate::error::{BoxError, PipelineError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// Rewrites outgoing HTML.
pub type HtmlTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Options a hook passes to the terminal resolver.
#[derive(Clone, Default)]
pub struct ResolveOptions {
    transforms: Vec<HtmlTransform>,
}

impl fmt::Debug for ResolveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveOptions").field("transforms", &self.transforms.len()).finish()
    }
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform applied to the HTML body of the final response.
    pub fn transform_html<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn has_transform(&self) -> bool {
        !self.transforms.is_empty()
    }

    /// Run every transform over `html`, in order.
    pub fn apply(&self, html: String) -> String {
        self.transforms.iter().fold(html, |html, transform| transform(&html))
    }

    /// Apply transforms to `response` when its body is HTML.
    ///
    /// A response without `content-type` is treated as HTML. A stale
    /// `content-length` is dropped once the body changes.
    pub fn apply_to(&self, response: Response) -> Response {
        if !self.has_transform() || !is_html(&response) {
            return response;
        }
        let (mut parts, body) = response.into_parts();
        parts.headers.remove(CONTENT_LENGTH);
        Response::from_parts(parts, self.apply(body))
    }

    fn merge(mut self, inner: ResolveOptions) -> Self {
        self.transforms.extend(inner.transforms);
        self
    }
}

fn is_html(response: &Response) -> bool {
    match response.headers().get(CONTENT_TYPE) {
        None => true,
        Some(value) => value.to_str().map(|v| v.starts_with("text/html")).unwrap_or(false),
    }
}

/// Produces the response at the end of a chain.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Render a response for `ctx`, honoring `options`.
    async fn resolve(
        &self,
        ctx: &mut RequestContext,
        options: ResolveOptions,
    ) -> Result<Response, BoxError>;
}

#[async_trait]
impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    async fn resolve(
        &self,
        ctx: &mut RequestContext,
        options: ResolveOptions,
    ) -> Result<Response, BoxError> {
        (**self).resolve(ctx, options).await
    }
}

/// A request interceptor.
///
/// Errors returned by `next` must be propagated, not swallowed.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response, BoxError>;
}

#[async_trait]
impl<H: Hook + ?Sized> Hook for Arc<H> {
    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response, BoxError> {
        (**self).handle(ctx, next).await
    }
}

enum Tail<'a> {
    Resolver(&'a dyn Resolver),
    Continue(Box<Next<'a>>),
}

/// The remainder of a chain, handed to each hook.
pub struct Next<'a> {
    hooks: &'a [Arc<dyn Hook>],
    tail: Tail<'a>,
    options: ResolveOptions,
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining_hooks", &self.hooks.len())
            .field("options", &self.options)
            .finish()
    }
}

impl<'a> Next<'a> {
    /// Chain running `hooks` in order, then `resolver`.
    pub fn new(hooks: &'a [Arc<dyn Hook>], resolver: &'a dyn Resolver) -> Self {
        Self { hooks, tail: Tail::Resolver(resolver), options: ResolveOptions::default() }
    }

    /// Chain that goes straight to `resolver`; handy for testing one hook.
    pub fn terminal(resolver: &'a dyn Resolver) -> Self {
        Self::new(&[], resolver)
    }

    /// Continue the chain.
    pub fn run<'c>(self, ctx: &'c mut RequestContext) -> BoxFuture<'c, Result<Response, BoxError>>
    where
        'a: 'c,
    {
        self.run_with(ctx, ResolveOptions::default())
    }

    /// Continue the chain, adding `options` for the resolver.
    pub fn run_with<'c>(
        self,
        ctx: &'c mut RequestContext,
        options: ResolveOptions,
    ) -> BoxFuture<'c, Result<Response, BoxError>>
    where
        'a: 'c,
    {
        Box::pin(async move {
            let options = self.options.merge(options);
            match self.hooks.split_first() {
                Some((hook, rest)) => {
                    let next = Next { hooks: rest, tail: self.tail, options };
                    hook.handle(ctx, next).await
                }
                None => match self.tail {
                    Tail::Resolver(resolver) => resolver.resolve(ctx, options).await,
                    Tail::Continue(outer) => outer.run_with(ctx, options).await,
                },
            }
        })
    }
}

/// Hooks composed in declaration order.
///
/// A sequence is itself a [`Hook`], so sequences nest.
#[derive(Clone)]
pub struct Sequence {
    hooks: Arc<[Arc<dyn Hook>]>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self { hooks: Arc::from(Vec::new()) }
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence").field("hooks", &self.hooks.len()).finish()
    }
}

/// Compose `hooks` into one hook; the first runs first and wraps the rest.
pub fn compose<I>(hooks: I) -> Sequence
where
    I: IntoIterator<Item = Arc<dyn Hook>>,
{
    Sequence { hooks: hooks.into_iter().collect() }
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` to the end of the chain.
    pub fn then<H: Hook + 'static>(self, hook: H) -> Self {
        let mut hooks: Vec<Arc<dyn Hook>> = self.hooks.iter().cloned().collect();
        hooks.push(Arc::new(hook));
        Self { hooks: hooks.into() }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Terminate the chain with `resolver`, producing a handler.
    pub fn resolve_with<R: Resolver>(self, resolver: R) -> Pipeline<R> {
        Pipeline { sequence: self, resolver: Arc::new(resolver) }
    }
}

#[async_trait]
impl Hook for Sequence {
    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response, BoxError> {
        let chain = Next {
            hooks: &self.hooks,
            tail: Tail::Continue(Box::new(next)),
            options: ResolveOptions::default(),
        };
        chain.run(ctx).await
    }
}

/// A composed hook chain plus its resolver.
///
/// Handling a request runs the chain, then writes every cookie queued in
/// the context's jar as a `Set-Cookie` header on the response.
pub struct Pipeline<R> {
    sequence: Sequence,
    resolver: Arc<R>,
}

impl<R> Clone for Pipeline<R> {
    fn clone(&self) -> Self {
        Self { sequence: self.sequence.clone(), resolver: self.resolver.clone() }
    }
}

impl<R> fmt::Debug for Pipeline<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("sequence", &self.sequence).finish()
    }
}

impl<R: Resolver> Pipeline<R> {
    /// Handle one request end to end.
    pub async fn handle(&self, mut ctx: RequestContext) -> Result<Response, BoxError> {
        let response = self.handle_mut(&mut ctx).await?;
        let response = write_cookies(&ctx, response)?;
        tracing::debug!(
            method = %ctx.method(),
            path = ctx.url().path(),
            status = response.status().as_u16(),
            "request handled"
        );
        Ok(response)
    }

    /// Run the chain against a borrowed context without writing cookies.
    pub async fn handle_mut(&self, ctx: &mut RequestContext) -> Result<Response, BoxError> {
        let resolver: &dyn Resolver = &*self.resolver;
        Next::new(&self.sequence.hooks, resolver).run(ctx).await
    }
}

fn write_cookies(ctx: &RequestContext, mut response: Response) -> Result<Response, PipelineError> {
    for value in ctx.cookies.set_cookie_headers()? {
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(response)
}

impl<R: Resolver + 'static> Service<RequestContext> for Pipeline<R> {
    type Response = Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Response, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: RequestContext) -> Self::Future {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.handle(ctx).await })
    }
}

/// Hook built from a closure; see [`hook_fn`].
pub struct FnHook<F> {
    f: F,
}

/// Build a hook from a closure returning a boxed future.
///
/// ```
/// use pagehook::prelude::*;
///
/// let _tagging = hook_fn(|ctx, next| {
///     Box::pin(async move {
///         let mut response = next.run(ctx).await?;
///         response.headers_mut().insert("x-served-by", "pagehook".parse()?);
///         Ok::<_, BoxError>(response)
///     })
/// });
/// ```
pub fn hook_fn<F>(f: F) -> FnHook<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Next<'a>) -> BoxFuture<'a, Result<Response, BoxError>>
        + Send
        + Sync,
{
    FnHook { f }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Next<'a>) -> BoxFuture<'a, Result<Response, BoxError>>
        + Send
        + Sync,
{
    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response, BoxError> {
        (self.f)(ctx, next).await
    }
}

/// Synchronous resolver built from a closure; see [`resolver_fn`].
pub struct FnResolver<F> {
    f: F,
}

/// Build a resolver from a render closure. Transforms are applied to its
/// output automatically.
pub fn resolver_fn<F>(f: F) -> FnResolver<F>
where
    F: Fn(&RequestContext) -> Result<Response, BoxError> + Send + Sync,
{
    FnResolver { f }
}

#[async_trait]
impl<F> Resolver for FnResolver<F>
where
    F: Fn(&RequestContext) -> Result<Response, BoxError> + Send + Sync,
{
    async fn resolve(
        &self,
        ctx: &mut RequestContext,
        options: ResolveOptions,
    ) -> Result<Response, BoxError> {
        let response = (self.f)(ctx)?;
        Ok(options.apply_to(response))
    }
}

/// Adapts a tower service into a resolver.
///
/// The service receives a snapshot of the context; cookie writes made by
/// the service are not seen by the pipeline.
#[derive(Clone, Debug)]
pub struct ServiceResolver<S> {
    inner: S,
}

impl<S> ServiceResolver<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> Resolver for ServiceResolver<S>
where
    S: Service<RequestContext, Response = Response> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
{
    async fn resolve(
        &self,
        ctx: &mut RequestContext,
        options: ResolveOptions,
    ) -> Result<Response, BoxError> {
        let response = self.inner.clone().oneshot(ctx.clone()).await.map_err(Into::<BoxError>::into)?;
        Ok(options.apply_to(response))
    }
}

/// Tower layer placing a hook [`Sequence`] in front of a service.
#[derive(Clone, Debug)]
pub struct PipelineLayer {
    sequence: Sequence,
}

impl PipelineLayer {
    pub fn new(sequence: Sequence) -> Self {
        Self { sequence }
    }
}

impl<S> Layer<S> for PipelineLayer
where
    S: Service<RequestContext, Response = Response> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
{
    type Service = Pipeline<ServiceResolver<S>>;

    fn layer(&self, service: S) -> Self::Service {
        self.sequence.clone().resolve_with(ServiceResolver::new(service))
    }
}
