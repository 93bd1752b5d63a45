//! Per-request context shared by every hook in a chain.

use crate::cookies::CookieJar;
use crate::hooks::color_scheme::ColorScheme;
use http::header::{HeaderMap, HeaderName};
use http::Method;
use url::Url;

/// Response type produced by hooks and resolvers.
///
/// The body is text so HTML transforms can rewrite it in place.
pub type Response = http::Response<String>;

/// Marker the host framework puts in route ids of API endpoints.
pub const API_ROUTE_MARKER: &str = "(api)";

/// Settings resolved on the server and handed to rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SharedSettings {
    pub color_scheme: ColorScheme,
}

/// State for one inbound request.
///
/// Created fresh per request, threaded by `&mut` through the chain and
/// dropped once the response is produced.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    url: Url,
    headers: HeaderMap,
    route_id: Option<String>,
    /// Cookies sent by the client plus writes queued for the response.
    pub cookies: CookieJar,
    /// Written by the color-scheme hook, read by rendering.
    pub shared_settings: SharedSettings,
    /// Same-origin `Referer`, written by the referer-tracking hook.
    pub referer: Option<Url>,
}

impl RequestContext {
    /// Context for a `GET` of `url` with no headers.
    pub fn new(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            route_id: None,
            cookies: CookieJar::new(),
            shared_settings: SharedSettings::default(),
            referer: None,
        }
    }

    /// Build a context from an `http` request.
    ///
    /// Scheme and authority always come from `base`; only the path and
    /// query of the request URI are used, so a target such as
    /// `//other.host/x` stays on `base`'s host.
    pub fn from_request<B>(req: &http::Request<B>, base: &Url) -> Self {
        let mut url = base.clone();
        match req.uri().path_and_query() {
            Some(pq) => {
                url.set_path(pq.path());
                url.set_query(pq.query());
            }
            None => {
                url.set_path("/");
                url.set_query(None);
            }
        }
        Self::new(url).with_method(req.method().clone()).with_headers(req.headers().clone())
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Replace request headers; the cookie jar is rebuilt from them.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.cookies = CookieJar::from_headers(&headers);
        self.headers = headers;
        self
    }

    pub fn with_route_id(mut self, route_id: impl Into<String>) -> Self {
        self.route_id = Some(route_id.into());
        self
    }

    pub fn with_cookies(mut self, cookies: CookieJar) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text; `None` when absent or not visible ASCII.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes()).ok()?;
        self.headers.get(name)?.to_str().ok()
    }

    /// First value of query parameter `name`, percent-decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    /// Whether the matched route lives in the API namespace.
    pub fn is_api_route(&self) -> bool {
        self.route_id.as_deref().is_some_and(|id| id.contains(API_ROUTE_MARKER))
    }
}
