//! Per-request cookie jar.
//!
//! The jar holds the cookies the client sent plus every cookie set or
//! deleted while the request travels through the hook chain. Reads see
//! writes made earlier in the same request. Once the chain has produced a
//! response the pipeline serializes the outgoing cookies into
//! `Set-Cookie` headers.

use crate::error::PipelineError;
use http::header::{HeaderMap, HeaderValue, COOKIE};
use std::collections::HashMap;
use std::fmt;

/// Seven days, the lifetime of persisted preference cookies.
pub const PREFERENCE_MAX_AGE_SECS: u64 = 604_800;

/// Whether `name` is usable as a cookie name: a non-empty RFC 6265 token.
///
/// ```
/// use pagehook::cookies::is_valid_name;
///
/// assert!(is_valid_name("blog-color-scheme"));
/// assert!(!is_valid_name("theme=x"));
/// assert!(!is_valid_name(""));
/// ```
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// Attributes attached to an outgoing cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub path: Option<String>,
    /// Lifetime in seconds; `Some(0)` expires the cookie immediately.
    pub max_age: Option<u64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: Some("/".to_string()),
            max_age: None,
            secure: true,
            http_only: true,
            same_site: Some(SameSite::Lax),
        }
    }
}

impl CookieOptions {
    /// Server-only cookie living for [`PREFERENCE_MAX_AGE_SECS`].
    pub fn common() -> Self {
        Self { max_age: Some(PREFERENCE_MAX_AGE_SECS), ..Self::default() }
    }

    /// Like [`CookieOptions::common`] but readable from client-side script.
    pub fn public() -> Self {
        Self { http_only: false, ..Self::common() }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age = Some(secs);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }
}

/// A cookie queued for the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub options: CookieOptions,
}

impl Cookie {
    fn is_removal(&self) -> bool {
        self.options.max_age == Some(0)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, urlencoding::encode(&self.value))?;
        let opts = &self.options;
        if let Some(path) = &opts.path {
            write!(f, "; Path={}", path)?;
        }
        if let Some(max_age) = opts.max_age {
            write!(f, "; Max-Age={}", max_age)?;
        }
        if let Some(same_site) = opts.same_site {
            write!(f, "; SameSite={}", same_site)?;
        }
        if opts.secure {
            write!(f, "; Secure")?;
        }
        if opts.http_only {
            write!(f, "; HttpOnly")?;
        }
        Ok(())
    }
}

/// Mutable cookie store scoped to one request/response pair.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    incoming: HashMap<String, String>,
    outgoing: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every `Cookie` header in `headers`.
    ///
    /// Malformed pairs are skipped. When a name repeats, the first value
    /// wins, matching how browsers order more specific paths first. Values
    /// are percent-decoded; one that does not decode to UTF-8 is kept as sent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut incoming = HashMap::new();
        for header in headers.get_all(COOKIE) {
            let Ok(raw) = header.to_str() else { continue };
            for pair in raw.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    let name = name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    incoming
                        .entry(name.to_string())
                        .or_insert_with(|| decode_value(value.trim().trim_matches('"')));
                }
            }
        }
        Self { incoming, outgoing: Vec::new() }
    }

    /// Seed a request cookie, mostly useful in tests.
    pub fn with_incoming(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.incoming.insert(name.into(), value.into());
        self
    }

    /// Current value of `name`, including writes made during this request.
    pub fn get(&self, name: &str) -> Option<&str> {
        if let Some(cookie) = self.outgoing.iter().rev().find(|c| c.name == name) {
            return if cookie.is_removal() { None } else { Some(cookie.value.as_str()) };
        }
        self.incoming.get(name).map(String::as_str)
    }

    /// Queue `name=value` for the response, replacing any earlier write.
    ///
    /// The value is percent-encoded when written out. Fails, queuing
    /// nothing, when `name` is not a valid cookie name.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        options: CookieOptions,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(PipelineError::InvalidCookieName { name });
        }
        self.outgoing.retain(|c| c.name != name);
        self.outgoing.push(Cookie { name, value: value.into(), options });
        Ok(())
    }

    /// Expire `name` on the client.
    pub fn delete(&mut self, name: impl Into<String>, options: CookieOptions) -> Result<(), PipelineError> {
        self.set(name, "", options.max_age(0))
    }

    /// Cookies queued for the response, in the order they were last set.
    pub fn outgoing(&self) -> &[Cookie] {
        &self.outgoing
    }

    /// Find a queued cookie by name.
    pub fn outgoing_cookie(&self, name: &str) -> Option<&Cookie> {
        self.outgoing.iter().find(|c| c.name == name)
    }

    /// Encode queued cookies as `Set-Cookie` header values.
    pub fn set_cookie_headers(&self) -> Result<Vec<HeaderValue>, PipelineError> {
        self.outgoing
            .iter()
            .map(|cookie| {
                HeaderValue::from_str(&cookie.to_string()).map_err(|source| {
                    PipelineError::InvalidHeader { name: cookie.name.clone(), source }
                })
            })
            .collect()
    }
}

fn decode_value(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(value) => value.into_owned(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cookie_header_pairs() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("cs=dark; session=abc; broken; =x"));
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.get("cs"), Some("dark"));
        assert_eq!(jar.get("session"), Some("abc"));
        assert_eq!(jar.get("broken"), None);
    }

    #[test]
    fn reads_see_writes_and_deletes() {
        let mut jar = CookieJar::new().with_incoming("cs", "light");
        jar.set("cs", "dark", CookieOptions::public()).unwrap();
        assert_eq!(jar.get("cs"), Some("dark"));
        jar.delete("cs", CookieOptions::default()).unwrap();
        assert_eq!(jar.get("cs"), None);
        assert_eq!(jar.outgoing().len(), 1, "later write replaces earlier one");
    }

    #[test]
    fn public_options_serialize_without_http_only() {
        let cookie = Cookie {
            name: "cs".into(),
            value: "dark".into(),
            options: CookieOptions::public(),
        };
        let header = cookie.to_string();
        assert_eq!(header, "cs=dark; Path=/; Max-Age=604800; SameSite=Lax; Secure");
    }

    #[test]
    fn common_options_are_http_only() {
        let opts = CookieOptions::common();
        assert!(opts.http_only);
        assert!(opts.secure);
        assert_eq!(opts.max_age, Some(PREFERENCE_MAX_AGE_SECS));
    }

    #[test]
    fn invalid_path_is_reported() {
        let mut jar = CookieJar::new();
        jar.set("bad", "v", CookieOptions::default().path("/a\nb")).unwrap();
        let err = jar.set_cookie_headers().unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn rejects_names_that_are_not_tokens() {
        let mut jar = CookieJar::new();
        for name in ["", "theme=x", "bad\nname", "two words", "semi;colon"] {
            let err = jar.set(name, "dark", CookieOptions::public()).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidCookieName { .. }), "{name:?}");
        }
        assert!(jar.outgoing().is_empty());
        assert!(jar.set("blog-color-scheme", "dark", CookieOptions::public()).is_ok());
    }

    #[test]
    fn values_are_percent_decoded_and_encoded() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("cs=%64ark; note=a%20b; raw=%FF; plus=a+b"));
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(jar.get("cs"), Some("dark"));
        assert_eq!(jar.get("note"), Some("a b"));
        assert_eq!(jar.get("raw"), Some("%FF"), "undecodable values are kept as sent");
        assert_eq!(jar.get("plus"), Some("a+b"));

        let mut jar = CookieJar::new();
        jar.set("note", "a b;c", CookieOptions::public()).unwrap();
        let header = jar.set_cookie_headers().unwrap().remove(0);
        assert!(header.to_str().unwrap().starts_with("note=a%20b%3Bc;"));
    }
}
