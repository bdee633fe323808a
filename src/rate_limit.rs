//! Sliding-window rate limiting for credential endpoints (§4.4, Testable
//! Property 8)
//!
//! Login and registration attempts are limited per-username rather than
//! per-connection, so the limiter is a small in-process map rather than the
//! global per-process governor the front door uses elsewhere. Expired
//! entries are pruned lazily on read, the same way pairing state prunes its
//! pending-request map.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Attempts allowed within a single window
const MAX_ATTEMPTS: usize = 5;

/// Window length in seconds
const WINDOW_SECONDS: i64 = 60;

struct Bucket {
    attempts: Vec<DateTime<Utc>>,
}

/// Per-username sliding-window limiter for credential endpoints
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    window: Duration,
    max_attempts: usize,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS, WINDOW_SECONDS)
    }
}

impl RateLimiter {
    /// Build a limiter with a custom cap and window, mainly for tests
    #[must_use]
    pub fn new(max_attempts: usize, window_seconds: i64) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            window: Duration::seconds(window_seconds),
            max_attempts,
        }
    }

    /// Record an attempt for `key` and report whether it is allowed.
    ///
    /// Returns `Ok(())` if the attempt may proceed, or `Err(retry_after_secs)`
    /// if the bucket is already at capacity. The attempt still counts even
    /// when over the cap is checked first so the check never touches
    /// whatever credential the caller is verifying.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let now = Utc::now();
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            attempts: Vec::new(),
        });

        let cutoff = now - self.window;
        bucket.attempts.retain(|at| *at > cutoff);

        if bucket.attempts.len() >= self.max_attempts {
            let oldest = bucket.attempts.first().copied().unwrap_or(now);
            let retry_at = oldest + self.window;
            let retry_after = (retry_at - now).num_seconds().max(1);
            return Err(retry_after as u64);
        }

        bucket.attempts.push(now);
        Ok(())
    }

    /// Clear all buckets. Test harnesses call this between cases instead of
    /// constructing a fresh limiter.
    pub fn reset(&self) {
        self.buckets.lock().expect("rate limiter mutex poisoned").clear();
    }

    /// Drop buckets with no attempts inside the current window. Call
    /// periodically to bound memory; `check` already self-prunes per key.
    pub fn sweep(&self) {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        buckets.retain(|_, bucket| {
            bucket.attempts.retain(|at| *at > cutoff);
            !bucket.attempts.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_cap() {
        let limiter = RateLimiter::new(5, 60);
        for _ in 0..5 {
            assert!(limiter.check("alice").is_ok());
        }
        assert!(limiter.check("alice").is_err());
    }

    #[test]
    fn test_sixth_attempt_rejected_with_retry_after() {
        let limiter = RateLimiter::default();
        for _ in 0..5 {
            limiter.check("alice").unwrap();
        }
        let err = limiter.check("alice").unwrap_err();
        assert!(err > 0 && err <= 60);
    }

    #[test]
    fn test_buckets_are_independent_per_key() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("alice").is_err());
        assert!(limiter.check("mallory").is_ok());
    }

    #[test]
    fn test_reset_clears_all_buckets() {
        let limiter = RateLimiter::new(1, 60);
        limiter.check("alice").unwrap();
        assert!(limiter.check("alice").is_err());
        limiter.reset();
        assert!(limiter.check("alice").is_ok());
    }

    #[test]
    fn test_sweep_drops_empty_buckets() {
        let limiter = RateLimiter::new(1, 0);
        limiter.check("alice").unwrap();
        limiter.sweep();
        assert!(limiter.buckets.lock().unwrap().is_empty());
    }
}
