//! Color-scheme preference hook.
//!
//! The preference is resolved from, in order: the `color-scheme` query
//! parameter (skipped while pre-rendering), the preference cookie, and
//! finally [`ColorScheme::System`]. Anything outside the three known
//! values is coerced to `system`.
//!
//! Server-side rendering cannot see the reader's OS preference, so
//! `system` renders with the `light` class. Client-side script reconciles
//! after hydration.

use crate::context::{RequestContext, Response};
use crate::cookies::{is_valid_name, CookieOptions};
use crate::error::{BoxError, ConfigError};
use crate::pipeline::{Hook, Next, ResolveOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Query parameter that overrides the stored preference.
pub const QUERY_PARAM: &str = "color-scheme";
/// Token in page templates replaced by the render class.
pub const DEFAULT_PLACEHOLDER: &str = "%color-scheme%";
/// Cookie used when none is configured.
pub const DEFAULT_COOKIE_NAME: &str = "blog-color-scheme";

/// A reader's theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    /// Follow the operating system.
    #[default]
    System,
    Light,
    Dark,
}

/// Returned by `ColorScheme::from_str` for values outside the enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown color scheme `{0}`")]
pub struct UnknownColorScheme(pub String);

impl ColorScheme {
    pub const ALL: [ColorScheme; 3] = [ColorScheme::System, ColorScheme::Light, ColorScheme::Dark];

    pub fn as_str(self) -> &'static str {
        match self {
            ColorScheme::System => "system",
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    }

    /// Parse `value`, falling back to `system` for anything unknown.
    pub fn coerce(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    /// Class stamped into server-rendered markup.
    pub fn render_class(self) -> &'static str {
        match self {
            ColorScheme::Dark => "dark",
            ColorScheme::Light | ColorScheme::System => "light",
        }
    }
}

impl FromStr for ColorScheme {
    type Err = UnknownColorScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ColorScheme::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == s)
            .ok_or_else(|| UnknownColorScheme(s.to_string()))
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTML rewrite setting: `false` disables it, a string replaces the
/// default placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transform {
    Enabled(bool),
    Placeholder(String),
}

impl Default for Transform {
    fn default() -> Self {
        Transform::Enabled(true)
    }
}

impl Transform {
    /// Token to replace, or `None` when rewriting is off.
    ///
    /// An empty placeholder counts as off; replacing the empty string
    /// would splice the class between every character.
    pub fn placeholder(&self) -> Option<&str> {
        match self {
            Transform::Enabled(false) => None,
            Transform::Enabled(true) => Some(DEFAULT_PLACEHOLDER),
            Transform::Placeholder(p) if p.is_empty() => None,
            Transform::Placeholder(p) => Some(p),
        }
    }
}

/// Construction options for [`ColorSchemeHook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSchemeOptions {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Set while pre-rendering; disables the query-parameter override.
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub transform: Transform,
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

impl Default for ColorSchemeOptions {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME)
    }
}

impl ColorSchemeOptions {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self { cookie_name: cookie_name.into(), building: false, transform: Transform::default() }
    }

    pub fn building(mut self, building: bool) -> Self {
        self.building = building;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Replace `placeholder` instead of [`DEFAULT_PLACEHOLDER`].
    pub fn placeholder(self, placeholder: impl Into<String>) -> Self {
        self.transform(Transform::Placeholder(placeholder.into()))
    }

    /// Leave HTML untouched.
    pub fn without_transform(self) -> Self {
        self.transform(Transform::Enabled(false))
    }

    /// The cookie name must be usable in a `Set-Cookie` header.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_name(&self.cookie_name) {
            return Err(ConfigError::InvalidCookieName { name: self.cookie_name.clone() });
        }
        Ok(())
    }
}

/// Resolves, persists and renders the reader's color scheme.
#[derive(Debug, Clone)]
pub struct ColorSchemeHook {
    options: ColorSchemeOptions,
    cookie_options: CookieOptions,
}

impl Default for ColorSchemeHook {
    fn default() -> Self {
        Self::new(ColorSchemeOptions::default())
    }
}

impl ColorSchemeHook {
    pub fn new(options: ColorSchemeOptions) -> Self {
        Self { options, cookie_options: CookieOptions::public() }
    }

    pub fn options(&self) -> &ColorSchemeOptions {
        &self.options
    }

    /// Resolve the preference for `ctx` without touching it.
    pub fn resolve(&self, ctx: &RequestContext) -> ColorScheme {
        let from_query = if self.options.building {
            None
        } else {
            ctx.query_param(QUERY_PARAM).filter(|v| !v.is_empty())
        };
        let raw = from_query.or_else(|| {
            ctx.cookies.get(&self.options.cookie_name).filter(|v| !v.is_empty()).map(str::to_string)
        });

        match raw {
            None => ColorScheme::System,
            Some(raw) => raw.parse().unwrap_or_else(|err: UnknownColorScheme| {
                tracing::debug!(%err, "falling back to system color scheme");
                ColorScheme::System
            }),
        }
    }
}

#[async_trait]
impl Hook for ColorSchemeHook {
    async fn handle(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response, BoxError> {
        let scheme = self.resolve(ctx);
        ctx.shared_settings.color_scheme = scheme;
        ctx.cookies.set(&self.options.cookie_name, scheme.as_str(), self.cookie_options.clone())?;

        if ctx.is_api_route() {
            return next.run(ctx).await;
        }
        let Some(placeholder) = self.options.transform.placeholder() else {
            return next.run(ctx).await;
        };

        let placeholder = placeholder.to_string();
        let class = scheme.render_class();
        let options = ResolveOptions::new().transform_html(move |html| html.replace(&placeholder, class));
        next.run_with(ctx, options).await
    }
}
