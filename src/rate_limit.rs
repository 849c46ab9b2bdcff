use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action limits, overridable through `RL_*` variables.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub login_limit: usize,
    pub login_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
    pub share_limit: usize,
    pub share_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_limit: 10,
            login_window: Duration::from_secs(300),
            comment_limit: 10,
            comment_window: Duration::from_secs(60),
            share_limit: 30,
            share_window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn dur_env(name: &str, default: Duration) -> Duration {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default)
        }
        let d = Self::default();
        Self {
            login_limit: usize_env("RL_LOGIN_LIMIT", d.login_limit),
            login_window: dur_env("RL_LOGIN_WINDOW", d.login_window),
            comment_limit: usize_env("RL_COMMENT_LIMIT", d.comment_limit),
            comment_window: dur_env("RL_COMMENT_WINDOW", d.comment_window),
            share_limit: usize_env("RL_SHARE_LIMIT", d.share_limit),
            share_window: dur_env("RL_SHARE_WINDOW", d.share_window),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }

    /// Keyed by client address; the caller is not known yet.
    pub fn allow_login(&self, ip: &str) -> bool {
        self.limiter.check(&format!("login:{ip}"), self.cfg.login_limit, self.cfg.login_window)
    }

    pub fn allow_comment(&self, user_id: i64) -> bool {
        self.limiter.check(&format!("comment:{user_id}"), self.cfg.comment_limit, self.cfg.comment_window)
    }

    pub fn allow_share(&self, user_id: i64) -> bool {
        self.limiter.check(&format!("share:{user_id}"), self.cfg.share_limit, self.cfg.share_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 {
            assert!(rl.check("k", 3, window));
        }
        assert!(!rl.check("k", 3, window));
    }

    #[test]
    fn keys_are_per_action() {
        let cfg = RateLimitConfig { comment_limit: 1, share_limit: 1, ..RateLimitConfig::default() };
        let rl = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
        assert!(rl.allow_comment(7));
        assert!(!rl.allow_comment(7));
        assert!(rl.allow_share(7));
        assert!(rl.allow_comment(8));
    }

    #[test]
    fn disabled_limiter_allows_everything() {
        let rl = InMemoryRateLimiter::new(false);
        for _ in 0..10 {
            assert!(rl.check("k", 1, Duration::from_secs(60)));
        }
    }
}
