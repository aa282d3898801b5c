use std::time::{Duration, Instant};

use dashmap::DashMap;

const MAX_FAILURES: u32 = 5;
const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Per-email login brute force limiter.
pub struct LoginRateLimiter {
    /// email -> (failed_count, window_start)
    entries: DashMap<String, (u32, Instant)>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check if login attempt is allowed. 5 failures per 15 minutes.
    /// Does NOT increment the counter — call `record_failure()` on invalid password.
    pub fn check(&self, email: &str) -> Result<(), u64> {
        self.check_at(email, Instant::now())
    }

    fn check_at(&self, email: &str, now: Instant) -> Result<(), u64> {
        let Some(entry) = self.entries.get(&email.to_lowercase()) else {
            return Ok(());
        };

        let (count, start) = entry.value();

        if now.duration_since(*start) > WINDOW {
            return Ok(());
        }

        if *count >= MAX_FAILURES {
            let elapsed = now.duration_since(*start).as_secs();
            return Err(WINDOW.as_secs().saturating_sub(elapsed));
        }

        Ok(())
    }

    /// Record a failed login attempt. Increments the counter for the given email.
    pub fn record_failure(&self, email: &str) {
        self.record_failure_at(email, Instant::now());
    }

    fn record_failure_at(&self, email: &str, now: Instant) {
        let mut entry = self.entries.entry(email.to_lowercase()).or_insert((0, now));
        let (count, start) = entry.value_mut();

        if now.duration_since(*start) > WINDOW {
            *count = 1;
            *start = now;
        } else {
            *count += 1;
        }
    }

    /// Forget the failures for an email after a successful login.
    pub fn reset(&self, email: &str) {
        self.entries.remove(&email.to_lowercase());
    }

    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.entries.retain(|_, (_, start)| now.duration_since(*start) < max_age);
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_after_five_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..4 {
            limiter.record_failure("a@x.com");
            assert!(limiter.check("a@x.com").is_ok());
        }
        limiter.record_failure("a@x.com");
        let retry_after = limiter.check("a@x.com").unwrap_err();
        assert!(retry_after > 0 && retry_after <= WINDOW.as_secs());
    }

    #[test]
    fn email_case_is_ignored() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            limiter.record_failure("A@X.com");
        }
        assert!(limiter.check("a@x.com").is_err());
        assert!(limiter.check("b@x.com").is_ok());
    }

    #[test]
    fn window_expiry_unlocks() {
        let limiter = LoginRateLimiter::new();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.record_failure_at("a@x.com", start);
        }
        assert!(limiter.check_at("a@x.com", start).is_err());

        let later = start + WINDOW + Duration::from_secs(1);
        assert!(limiter.check_at("a@x.com", later).is_ok());

        // The first failure after the window starts a fresh count.
        limiter.record_failure_at("a@x.com", later);
        assert!(limiter.check_at("a@x.com", later).is_ok());
    }

    #[test]
    fn reset_clears_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..5 {
            limiter.record_failure("a@x.com");
        }
        limiter.reset("a@x.com");
        assert!(limiter.check("a@x.com").is_ok());
    }

    #[test]
    fn cleanup_drops_stale_entries() {
        let limiter = LoginRateLimiter::new();
        limiter.record_failure("a@x.com");
        limiter.cleanup(Duration::ZERO);
        assert!(limiter.entries.is_empty());
    }
}
