//! Login throttling per account
//!
//! Counts attempts per key inside a sliding window; once the budget is spent
//! the key is banned for a fixed period. State lives in process memory, so
//! every auth replica throttles on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed per window
    pub max_attempts: u32,
    /// Window length
    pub window: Duration,
    /// Ban length once the budget is exceeded
    pub ban_duration: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(300),
            ban_duration: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug)]
struct Attempts {
    count: u32,
    window_started: Instant,
    banned_until: Option<Instant>,
}

impl Attempts {
    /// Nothing left to remember: no running ban and the window has closed
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        let banned = self.banned_until.is_some_and(|until| now < until);
        !banned && now.duration_since(self.window_started) >= window
    }
}

/// Rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, Attempts>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt for `key`; false means the caller must be turned away
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let window = self.config.window;
        entries.retain(|_, attempts| !attempts.is_stale(now, window));

        let entry = entries.entry(key.to_string()).or_insert(Attempts {
            count: 0,
            window_started: now,
            banned_until: None,
        });

        if let Some(until) = entry.banned_until {
            if now < until {
                return false;
            }
            entry.banned_until = None;
            entry.count = 0;
            entry.window_started = now;
        }

        if now.duration_since(entry.window_started) >= self.config.window {
            entry.count = 0;
            entry.window_started = now;
        }

        if entry.count >= self.config.max_attempts {
            entry.banned_until = Some(now + self.config.ban_duration);
            warn!(
                "Banned key {} for {} seconds",
                key,
                self.config.ban_duration.as_secs()
            );
            return false;
        }

        entry.count += 1;
        true
    }

    /// Forget the attempts for `key`, after a successful login
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window: Duration, ban: Duration) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_attempts: 3,
            window,
            ban_duration: ban,
        })
    }

    #[tokio::test]
    async fn test_bans_after_max_attempts() {
        let limiter = limiter(Duration::from_secs(60), Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.is_allowed("alice@example.com").await);
        }
        assert!(!limiter.is_allowed("alice@example.com").await);
        assert!(!limiter.is_allowed("alice@example.com").await);

        // other keys are unaffected
        assert!(limiter.is_allowed("bob@example.com").await);
    }

    #[tokio::test]
    async fn test_reset_clears_attempts() {
        let limiter = limiter(Duration::from_secs(60), Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.is_allowed("alice@example.com").await);
        }
        limiter.reset("alice@example.com").await;
        assert!(limiter.is_allowed("alice@example.com").await);
    }

    #[tokio::test]
    async fn test_window_and_ban_expire() {
        let limiter = limiter(Duration::from_millis(20), Duration::from_millis(20));

        for _ in 0..3 {
            assert!(limiter.is_allowed("carol@example.com").await);
        }
        assert!(!limiter.is_allowed("carol@example.com").await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.is_allowed("carol@example.com").await);
    }

    #[tokio::test]
    async fn test_stale_keys_are_evicted() {
        let limiter = limiter(Duration::from_millis(200), Duration::from_secs(60));

        for n in 0..50 {
            assert!(limiter.is_allowed(&format!("user{n}@example.com")).await);
        }
        // a banned key must outlive its window
        for _ in 0..4 {
            limiter.is_allowed("mallory@example.com").await;
        }
        assert_eq!(limiter.tracked_keys().await, 51);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(limiter.is_allowed("fresh@example.com").await);
        assert_eq!(limiter.tracked_keys().await, 2);
        assert!(!limiter.is_allowed("mallory@example.com").await);
    }

    #[test]
    fn test_default_config() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.window, Duration::from_secs(300));
        assert_eq!(config.ban_duration, Duration::from_secs(3600));
    }
}
