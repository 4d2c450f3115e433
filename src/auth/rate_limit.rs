//! Per-key issuance rate limiting.
//!
//! Provides a sliding window rate limiter to bound how many tokens a single
//! key (normally the user id) can obtain within a time window. Time comes
//! from the caller so the limiter follows the pipeline's injected clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::pipeline::Clock;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Rejected; the oldest counted issuance leaves the window after this many seconds.
    Limited { retry_after_secs: u64 },
}

/// A sliding window rate limiter that tracks issuances per key.
///
/// Each key can be admitted at most `max_requests` times within `window`
/// seconds. Check-and-record happens under one lock, so concurrent callers
/// can never be over-admitted. Keys with nothing left in the window are
/// swept at most once per window during `check_and_record`, so the map is
/// bounded by the keys active in the last two windows.
pub struct RateLimiter {
    state: Mutex<State>,
    /// Maximum admissions allowed per window
    max_requests: usize,
    /// Window length in seconds
    window: u64,
}

#[derive(Default)]
struct State {
    /// Admission timestamps (unix seconds) per key
    requests: HashMap<String, Vec<u64>>,
    /// Time of the last full sweep
    last_sweep: u64,
}

impl State {
    fn sweep(&mut self, now: u64, cutoff: u64) {
        self.requests.retain(|_, times| {
            times.retain(|&t| t > cutoff);
            !times.is_empty()
        });
        self.last_sweep = now;
    }
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Maximum admissions allowed per window
    /// * `window_seconds` - Duration of the sliding window in seconds
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_requests,
            window: window_seconds,
        }
    }

    /// Limiter with a one-minute window.
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, 60)
    }

    pub fn limit(&self) -> usize {
        self.max_requests
    }

    /// Check whether `key` may be admitted at `now`, recording it if so.
    pub fn check_and_record(&self, key: &str, now: u64) -> RateDecision {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now.saturating_sub(self.window);

        if now >= state.last_sweep.saturating_add(self.window) {
            state.sweep(now, cutoff);
        }

        let entry = state.requests.entry(key.to_string()).or_default();

        // Drop admissions outside the window
        entry.retain(|&t| t > cutoff);

        if entry.len() >= self.max_requests {
            let oldest = entry.iter().copied().min().unwrap_or(now);
            return RateDecision::Limited {
                retry_after_secs: (oldest + self.window).saturating_sub(now).max(1),
            };
        }

        entry.push(now);
        RateDecision::Allowed
    }

    /// Check whether `key` would be admitted without recording.
    pub fn check(&self, key: &str, now: u64) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now.saturating_sub(self.window);

        state
            .requests
            .get(key)
            .map(|times| times.iter().filter(|&&t| t > cutoff).count() < self.max_requests)
            .unwrap_or(true)
    }

    /// Drop keys with no admissions left in the window.
    pub fn cleanup(&self, now: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sweep(now, now.saturating_sub(self.window));
    }

    /// Get the number of keys being tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .requests
            .len()
    }

    /// Start a background cleanup task.
    ///
    /// This spawns a tokio task that periodically drops stale keys to
    /// prevent unbounded memory growth.
    pub fn start_cleanup_task(self: &Arc<Self>, clock: Arc<dyn Clock>, interval: Duration) {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                limiter.cleanup(clock.now());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    #[test]
    fn test_rate_limiter_allows_under_limit() {
        let limiter = RateLimiter::new(5, 60);

        for _ in 0..5 {
            assert_eq!(limiter.check_and_record("u1", T0), RateDecision::Allowed);
        }
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let limiter = RateLimiter::new(3, 60);

        assert_eq!(limiter.check_and_record("u1", T0), RateDecision::Allowed);
        assert_eq!(limiter.check_and_record("u1", T0 + 1), RateDecision::Allowed);
        assert_eq!(limiter.check_and_record("u1", T0 + 2), RateDecision::Allowed);

        assert_eq!(
            limiter.check_and_record("u1", T0 + 10),
            RateDecision::Limited {
                retry_after_secs: 50
            }
        );
    }

    #[test]
    fn test_rate_limiter_separate_keys() {
        let limiter = RateLimiter::new(2, 60);

        assert_eq!(limiter.check_and_record("u1", T0), RateDecision::Allowed);
        assert_eq!(limiter.check_and_record("u1", T0), RateDecision::Allowed);
        assert!(matches!(
            limiter.check_and_record("u1", T0),
            RateDecision::Limited { .. }
        ));

        // Another key still has its full budget
        assert_eq!(limiter.check_and_record("u2", T0), RateDecision::Allowed);
        assert_eq!(limiter.check_and_record("u2", T0), RateDecision::Allowed);
    }

    #[test]
    fn test_rate_limiter_window_expiry() {
        let limiter = RateLimiter::new(2, 60);

        assert_eq!(limiter.check_and_record("u1", T0), RateDecision::Allowed);
        assert_eq!(limiter.check_and_record("u1", T0), RateDecision::Allowed);
        assert!(matches!(
            limiter.check_and_record("u1", T0 + 59),
            RateDecision::Limited { .. }
        ));

        // Next window
        assert_eq!(limiter.check_and_record("u1", T0 + 60), RateDecision::Allowed);
    }

    #[test]
    fn test_rate_limiter_cleanup() {
        let limiter = RateLimiter::new(10, 1);

        limiter.check_and_record("a", T0);
        limiter.check_and_record("b", T0);
        limiter.check_and_record("c", T0);
        assert_eq!(limiter.tracked_keys(), 3);

        limiter.cleanup(T0 + 2);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_idle_keys_swept_on_admission() {
        let limiter = RateLimiter::per_minute(10);
        for user in 0..500 {
            limiter.check_and_record(&format!("user-{}", user), T0);
        }
        assert_eq!(limiter.tracked_keys(), 500);

        // Inside the same window nothing is dropped
        limiter.check_and_record("late", T0 + 30);
        assert_eq!(limiter.tracked_keys(), 501);

        limiter.check_and_record("next-day", T0 + 86_400);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_check_without_recording() {
        let limiter = RateLimiter::new(2, 60);

        assert!(limiter.check("u1", T0));

        limiter.check_and_record("u1", T0);
        limiter.check_and_record("u1", T0);

        assert!(!limiter.check("u1", T0));
        assert!(limiter.check("u2", T0));
    }

    #[test]
    fn test_concurrent_admission_is_exact() {
        let limiter = Arc::new(RateLimiter::per_minute(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check_and_record("shared", T0) == RateDecision::Allowed)
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[tokio::test]
    async fn test_cleanup_task_follows_clock() {
        use crate::pipeline::ManualClock;

        let limiter = Arc::new(RateLimiter::new(10, 60));
        let clock = Arc::new(ManualClock::new(T0));
        limiter.check_and_record("u1", T0);
        assert_eq!(limiter.tracked_keys(), 1);

        clock.advance(120);
        limiter.start_cleanup_task(clock, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(limiter.tracked_keys(), 0);
    }
}
