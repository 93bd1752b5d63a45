//! Hooks shipped with the crate.
//!
//! - [`RefererHook`]: remembers a same-origin `Referer` on the context.
//! - [`ColorSchemeHook`]: resolves the reader's theme preference, persists
//!   it in a cookie and stamps the render class into server-rendered HTML.
//!
//! The rate-limit hook lives with the limiter in
//! [`crate::rate_limit::middleware`].

pub mod color_scheme;
pub mod referer;

pub use color_scheme::{ColorScheme, ColorSchemeHook, ColorSchemeOptions, Transform};
pub use referer::RefererHook;
