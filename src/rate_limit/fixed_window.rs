use super::store::{InMemoryWindowStore, WindowStore};
use super::{RateLimitConfig, RateLimitResult, WindowEntry};
use crate::clock::{Clock, SystemClock};

/// A per-key fixed-window rate limiter.
///
/// `check` is synchronous: the read-check-write of an entry happens inside
/// one [`WindowStore::update`] call, so concurrent requests for the same
/// key cannot both slip under the limit.
///
/// ```
/// use pagehook::clock::ManualClock;
/// use pagehook::rate_limit::{FixedWindowLimiter, RateLimitConfig};
///
/// let clock = ManualClock::new(0);
/// let limiter = FixedWindowLimiter::with_clock(clock.clone());
/// let config = RateLimitConfig::new(2, 1_000).unwrap();
///
/// assert!(limiter.check("10.0.0.1", &config).allowed);
/// assert!(limiter.check("10.0.0.1", &config).allowed);
/// assert!(!limiter.check("10.0.0.1", &config).allowed);
///
/// clock.advance(1_001);
/// assert!(limiter.check("10.0.0.1", &config).allowed);
/// ```
#[derive(Debug, Clone)]
pub struct FixedWindowLimiter<C = SystemClock, S = InMemoryWindowStore> {
    clock: C,
    store: S,
}

impl FixedWindowLimiter {
    /// Limiter on the wall clock with an in-memory store.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FixedWindowLimiter<C> {
    pub fn with_clock(clock: C) -> Self {
        Self::with_store(InMemoryWindowStore::new(), clock)
    }
}

impl<C, S> FixedWindowLimiter<C, S>
where
    C: Clock,
    S: WindowStore,
{
    pub fn with_store(store: S, clock: C) -> Self {
        Self { clock, store }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current time according to the limiter's clock.
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Count one request for `key` against `config`.
    pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        let now = self.clock.now_millis();
        let max = config.max_requests();

        let result = self.store.update(key, |slot| match slot {
            Some(entry) if !entry.is_expired(now) => {
                if entry.count >= max {
                    RateLimitResult { allowed: false, remaining: 0, reset_at: entry.reset_at }
                } else {
                    entry.count += 1;
                    RateLimitResult {
                        allowed: true,
                        remaining: max - entry.count,
                        reset_at: entry.reset_at,
                    }
                }
            }
            _ => {
                let reset_at = now.saturating_add(config.window_ms());
                *slot = Some(WindowEntry { count: 1, reset_at });
                RateLimitResult { allowed: true, remaining: max - 1, reset_at }
            }
        });

        if !result.allowed {
            tracing::warn!(
                key,
                retry_after_ms = result.reset_at.saturating_sub(now),
                "rate limit exceeded"
            );
        }
        result
    }

    /// Drop entries whose window has closed; returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.store.remove_expired(self.clock.now_millis())
    }
}
