use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

/// Sliding window in-memory rate limiter (process local).
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
        if !self.enabled { return true; }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub suggestion_limit: usize,
    pub suggestion_window: Duration,
    pub reply_limit: usize,
    pub reply_window: Duration,
    pub signature_limit: usize,
    pub signature_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize { std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }
        fn dur_env(name: &str, default: u64) -> Duration { Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)) }
        Self {
            suggestion_limit: usize_env("RL_SUGGESTION_LIMIT", 5),
            suggestion_window: dur_env("RL_SUGGESTION_WINDOW", 3600),
            reply_limit: usize_env("RL_REPLY_LIMIT", 20),
            reply_window: dur_env("RL_REPLY_WINDOW", 60),
            signature_limit: usize_env("RL_SIGNATURE_LIMIT", 30),
            signature_window: dur_env("RL_SIGNATURE_WINDOW", 3600),
        }
    }
}

/// Per-action guard used by handlers, keyed by uid.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }

    pub fn from_env() -> Self {
        let enabled = std::env::var("RATE_LIMIT_ENABLED").map(|v| v != "0" && !v.eq_ignore_ascii_case("false")).unwrap_or(true);
        Self::new(InMemoryRateLimiter::new(enabled), RateLimitConfig::from_env())
    }

    pub fn allow_suggestion(&self, uid: &str) -> bool { self.limiter.check(&format!("suggestion:{uid}"), self.cfg.suggestion_limit, self.cfg.suggestion_window) }
    pub fn allow_reply(&self, uid: &str) -> bool { self.limiter.check(&format!("reply:{uid}"), self.cfg.reply_limit, self.cfg.reply_window) }
    pub fn allow_signature(&self, uid: &str) -> bool { self.limiter.check(&format!("signature:{uid}"), self.cfg.signature_limit, self.cfg.signature_window) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 { assert!(rl.check("k", 3, window)); }
        assert!(!rl.check("k", 3, window));
    }

    #[test]
    fn window_expiry_readmits() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(20);
        assert!(rl.check("k", 1, window));
        assert!(!rl.check("k", 1, window));
        std::thread::sleep(Duration::from_millis(30));
        assert!(rl.check("k", 1, window));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let rl = InMemoryRateLimiter::new(false);
        for _ in 0..10 { assert!(rl.check("k", 1, Duration::from_secs(60))); }
    }

    #[test]
    fn actions_are_keyed_separately() {
        let cfg = RateLimitConfig {
            suggestion_limit: 1, suggestion_window: Duration::from_secs(60),
            reply_limit: 1, reply_window: Duration::from_secs(60),
            signature_limit: 1, signature_window: Duration::from_secs(60),
        };
        let f = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
        assert!(f.allow_suggestion("u1"));
        assert!(f.allow_reply("u1"));
        assert!(f.allow_suggestion("u2"));
        assert!(!f.allow_suggestion("u1"));
    }
}
