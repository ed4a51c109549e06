//! 滑动窗口限流器
//! Sliding-window rate limiter
//!
//! 每用户一份时间戳列表，检查时惰性剪除窗口外的旧戳。拒绝不记录
//! 时间戳，不消耗窗口名额。
//! One timestamp list per user, lazily pruned of out-of-window entries
//! on check. A denial records nothing and consumes no window slot.

use chrono::Utc;
use dashmap::DashMap;

pub struct RateLimiter {
    windows: DashMap<String, Vec<i64>>,
    window_ms: i64,
    max_events: usize,
}

impl RateLimiter {
    pub fn new(window_ms: i64, max_events: usize) -> Self {
        Self {
            windows: DashMap::new(),
            window_ms,
            max_events,
        }
    }

    pub fn allow(&self, user_id: &str) -> bool {
        self.allow_at(user_id, Utc::now().timestamp_millis())
    }

    /// 显式时钟入口，便于确定性测试
    /// Explicit-clock entry point for deterministic tests
    pub fn allow_at(&self, user_id: &str, now_ms: i64) -> bool {
        let cutoff = now_ms - self.window_ms;
        let mut stamps = self.windows.entry(user_id.to_string()).or_default();
        stamps.retain(|&t| t > cutoff);
        if stamps.len() < self.max_events {
            stamps.push(now_ms);
            true
        } else {
            false
        }
    }

    /// 断开连接时遗忘该用户的窗口
    /// Forget the user's window on disconnect
    pub fn forget(&self, user_id: &str) {
        self.windows.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_plus_one_is_denied() {
        let limiter = RateLimiter::new(60_000, 100);
        for i in 0..100 {
            assert!(limiter.allow_at("alice", i));
        }
        assert!(!limiter.allow_at("alice", 100));
    }

    #[test]
    fn denial_consumes_no_slot() {
        let limiter = RateLimiter::new(1_000, 2);
        assert!(limiter.allow_at("alice", 0));
        assert!(limiter.allow_at("alice", 10));
        // 两次拒绝不得延长窗口 / Two denials must not extend the window
        assert!(!limiter.allow_at("alice", 20));
        assert!(!limiter.allow_at("alice", 30));
        // 最早的时间戳过期后立即放行 / Allowed as soon as the oldest expires
        assert!(limiter.allow_at("alice", 1_001));
    }

    #[test]
    fn windows_are_per_user() {
        let limiter = RateLimiter::new(1_000, 1);
        assert!(limiter.allow_at("alice", 0));
        assert!(limiter.allow_at("bob", 0));
        assert!(!limiter.allow_at("alice", 1));
    }

    #[test]
    fn forget_resets_the_window() {
        let limiter = RateLimiter::new(60_000, 1);
        assert!(limiter.allow_at("alice", 0));
        assert!(!limiter.allow_at("alice", 1));
        limiter.forget("alice");
        assert!(limiter.allow_at("alice", 2));
    }
}
