//! Live-updatable configuration handles.
//!
//! Reads go through `ArcSwap` and never block; an update swaps in a whole
//! new value, so readers see either the old quota or the new one.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;

/// Shared, swappable configuration value.
///
/// Clones share the same slot: a [`DynamicConfig::set`] through one clone
/// is seen by every hook or service holding another.
pub struct DynamicConfig<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for DynamicConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DynamicConfig").field(&*self.inner.load()).finish()
    }
}

impl<T: Default> Default for DynamicConfig<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for DynamicConfig<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Derive the next value from the current one.
    ///
    /// `f` may run more than once if another update races this one.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T,
    {
        self.inner.rcu(|current| f(current));
    }
}
