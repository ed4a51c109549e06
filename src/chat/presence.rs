//! 在线状态登记表
//! Presence registry
//!
//! 正向表 用户 -> 会话 与反向表 连接 -> 用户。同一用户重复注册时新
//! 连接取代旧连接：旧连接的反向映射被剔除，其后续断开成为空操作。
//! 不做TTL或心跳驱逐。
//! Forward table user -> session plus reverse table connection -> user.
//! Re-registration supersedes: the prior connection's reverse mapping is
//! evicted and its later disconnect becomes a no-op. No TTL or heartbeat
//! eviction.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub user_id: String,
    pub conn_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Default)]
pub struct Presence {
    users: DashMap<String, PresenceEntry>,
    by_conn: DashMap<String, String>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记用户；返回被取代的旧连接ID（如有）
    /// Register a user; returns the superseded connection id, if any
    pub fn register(&self, user_id: &str, conn_id: &str) -> Option<String> {
        let now = Utc::now();
        let previous = self.users.insert(
            user_id.to_string(),
            PresenceEntry {
                user_id: user_id.to_string(),
                conn_id: conn_id.to_string(),
                connected_at: now,
                last_activity: now,
            },
        );
        let superseded = previous
            .filter(|prev| prev.conn_id != conn_id)
            .map(|prev| prev.conn_id);
        if let Some(old_conn) = &superseded {
            self.by_conn.remove(old_conn);
        }
        self.by_conn.insert(conn_id.to_string(), user_id.to_string());
        superseded
    }

    /// 连接断开；仅当该连接仍持有用户会话时返回用户ID
    /// Connection teardown; returns the user id only if this connection
    /// still owns the session
    pub fn disconnect(&self, conn_id: &str) -> Option<String> {
        let (_, user_id) = self.by_conn.remove(conn_id)?;
        let owns = self
            .users
            .get(&user_id)
            .map(|entry| entry.conn_id == conn_id)
            .unwrap_or(false);
        if owns {
            self.users.remove(&user_id);
            Some(user_id)
        } else {
            None
        }
    }

    pub fn touch(&self, user_id: &str) {
        if let Some(mut entry) = self.users.get_mut(user_id) {
            entry.last_activity = Utc::now();
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn conn_of(&self, user_id: &str) -> Option<String> {
        self.users.get(user_id).map(|entry| entry.conn_id.clone())
    }

    pub fn user_of_conn(&self, conn_id: &str) -> Option<String> {
        self.by_conn.get(conn_id).map(|user| user.value().clone())
    }

    /// 在线用户列表，按ID排序保证输出确定
    /// Online user list, sorted for deterministic output
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_disconnect_roundtrip() {
        let presence = Presence::new();
        assert_eq!(presence.register("alice", "c1"), None);
        assert!(presence.is_online("alice"));
        assert_eq!(presence.conn_of("alice").as_deref(), Some("c1"));
        assert_eq!(presence.user_of_conn("c1").as_deref(), Some("alice"));

        assert_eq!(presence.disconnect("c1").as_deref(), Some("alice"));
        assert!(!presence.is_online("alice"));
    }

    #[test]
    fn reregistration_supersedes_and_old_disconnect_is_noop() {
        let presence = Presence::new();
        presence.register("alice", "c1");
        assert_eq!(presence.register("alice", "c2").as_deref(), Some("c1"));

        assert_eq!(presence.conn_of("alice").as_deref(), Some("c2"));
        assert_eq!(presence.user_of_conn("c1"), None);

        // 旧连接迟到的断开不得影响新会话
        // The old connection's late disconnect must not affect the new session
        assert_eq!(presence.disconnect("c1"), None);
        assert!(presence.is_online("alice"));

        assert_eq!(presence.disconnect("c2").as_deref(), Some("alice"));
        assert!(!presence.is_online("alice"));
    }

    #[test]
    fn online_users_are_sorted() {
        let presence = Presence::new();
        presence.register("carol", "c3");
        presence.register("alice", "c1");
        presence.register("bob", "c2");
        assert_eq!(presence.online_users(), vec!["alice", "bob", "carol"]);
    }
}
