//! Sliding-window rate limiting keyed by (client identity, endpoint).
//!
//! The window table is process-lifetime only; it is constructed once at
//! startup and shared by reference. A periodic sweep drops keys that have
//! gone quiet so the table stays bounded.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default trailing window length
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the window after this one
    pub remaining: u32,
    /// How long until the oldest retained request expires (deny only)
    pub retry_after: Option<Duration>,
}

/// Sliding-window request counter
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record a request for `key`. Allows iff fewer than `limit`
    /// requests remain inside the trailing `window`.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> RateDecision {
        self.check_at(key, limit, window, Instant::now())
    }

    fn check_at(&self, key: &str, limit: usize, window: Duration, now: Instant) -> RateDecision {
        let mut windows = self.lock_windows();
        let instants = windows.entry(key.to_string()).or_default();

        instants.retain(|t| now.duration_since(*t) < window);

        if instants.len() < limit {
            instants.push(now);
            RateDecision {
                allowed: true,
                remaining: (limit - instants.len()) as u32,
                retry_after: None,
            }
        } else {
            let oldest = instants.first().copied().unwrap_or(now);
            let retry_after = window.saturating_sub(now.duration_since(oldest));
            RateDecision {
                allowed: false,
                remaining: 0,
                retry_after: Some(retry_after),
            }
        }
    }

    /// Drop keys with no activity for `idle_after`. Best-effort bookkeeping;
    /// a key that survives a sweep still prunes itself on its next check.
    pub fn sweep(&self, idle_after: Duration) {
        let now = Instant::now();
        let mut windows = self.lock_windows();
        let before = windows.len();
        windows.retain(|_, instants| {
            instants
                .last()
                .map(|t| now.duration_since(*t) < idle_after)
                .unwrap_or(false)
        });
        let removed = before - windows.len();
        if removed > 0 {
            log::debug!("Rate limiter: swept {} idle keys", removed);
        }
    }

    fn lock_windows(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        // A poisoned lock only means another thread panicked mid-check;
        // the window data itself is still usable.
        match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for i in 0..3 {
            let decision = limiter.check_at("k:roleplay", 3, WINDOW, now);
            assert!(decision.allowed, "request {} should pass", i);
        }

        let denied = limiter.check_at("k:roleplay", 3, WINDOW, now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after.unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert_eq!(limiter.check_at("k", 3, WINDOW, now).remaining, 2);
        assert_eq!(limiter.check_at("k", 3, WINDOW, now).remaining, 1);
        assert_eq!(limiter.check_at("k", 3, WINDOW, now).remaining, 0);
    }

    #[test]
    fn test_window_elapses() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..2 {
            assert!(limiter.check_at("k", 2, WINDOW, start).allowed);
        }
        assert!(!limiter.check_at("k", 2, WINDOW, start).allowed);

        // The same key is allowed again once the window has passed
        let later = start + WINDOW + Duration::from_millis(1);
        assert!(limiter.check_at("k", 2, WINDOW, later).allowed);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(limiter.check_at("a:lesson", 1, WINDOW, now).allowed);
        assert!(!limiter.check_at("a:lesson", 1, WINDOW, now).allowed);
        assert!(limiter.check_at("b:lesson", 1, WINDOW, now).allowed);
    }

    #[test]
    fn test_sweep_drops_idle_keys() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        limiter.check_at("idle", 5, WINDOW, now);

        limiter.sweep(Duration::ZERO);

        let windows = limiter.lock_windows();
        assert!(!windows.contains_key("idle"));
    }
}
