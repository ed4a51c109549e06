//! 运行指标与输入状态追踪
//! Runtime metrics and typing-state tracking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde::Serialize;

/// 平均时延的采样环大小 / Sample ring size for the latency average
const LATENCY_SAMPLES: usize = 100;

pub struct ChatMetrics {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    peak_connections: AtomicU64,
    messages_sent: AtomicU64,
    messages_delivered: AtomicU64,
    messages_read: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
    started: Instant,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub peak_connections: u64,
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_read: u64,
    pub average_latency_ms: f64,
    pub uptime_secs: u64,
}

impl Default for ChatMetrics {
    fn default() -> Self {
        Self {
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            peak_connections: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            messages_read: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_SAMPLES)),
            started: Instant::now(),
        }
    }
}

impl ChatMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        let active = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_connections.fetch_max(active, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_read(&self) {
        self.messages_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency_ms(&self, latency_ms: u64) {
        let mut ring = self.latencies_ms.lock();
        if ring.len() == LATENCY_SAMPLES {
            ring.pop_front();
        }
        ring.push_back(latency_ms);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let average_latency_ms = {
            let ring = self.latencies_ms.lock();
            if ring.is_empty() {
                0.0
            } else {
                ring.iter().sum::<u64>() as f64 / ring.len() as f64
            }
        };
        MetricsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            peak_connections: self.peak_connections.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_read: self.messages_read.load(Ordering::Relaxed),
            average_latency_ms,
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// 输入状态：接收者 -> 正在输入的发送者集合
/// Typing state: receiver -> set of currently typing senders
#[derive(Default)]
pub struct TypingTracker {
    by_receiver: DashMap<String, DashSet<String>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, receiver_id: &str, sender_id: &str) {
        self.by_receiver
            .entry(receiver_id.to_string())
            .or_default()
            .insert(sender_id.to_string());
    }

    /// 返回该发送者此前是否在输入中
    /// Returns whether the sender was typing before removal
    pub fn stop(&self, receiver_id: &str, sender_id: &str) -> bool {
        self.by_receiver
            .get(receiver_id)
            .map(|senders| senders.remove(sender_id).is_some())
            .unwrap_or(false)
    }

    pub fn senders_for(&self, receiver_id: &str) -> Vec<String> {
        let mut senders: Vec<String> = self
            .by_receiver
            .get(receiver_id)
            .map(|set| set.iter().map(|s| s.key().clone()).collect())
            .unwrap_or_default();
        senders.sort();
        senders
    }

    /// 发送者离线时从所有集合移除；返回受影响的接收者
    /// Remove a departing sender from every set; returns affected receivers
    pub fn remove_everywhere(&self, sender_id: &str) -> Vec<String> {
        let mut affected = Vec::new();
        for entry in self.by_receiver.iter() {
            if entry.value().remove(sender_id).is_some() {
                affected.push(entry.key().clone());
            }
        }
        affected.sort();
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_tracks_the_high_water_mark() {
        let metrics = ChatMetrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();
        metrics.connection_opened();
        let snap = metrics.snapshot();
        assert_eq!(snap.total_connections, 3);
        assert_eq!(snap.active_connections, 2);
        assert_eq!(snap.peak_connections, 2);
    }

    #[test]
    fn latency_ring_is_bounded_and_averaged() {
        let metrics = ChatMetrics::new();
        for i in 0..150u64 {
            metrics.record_latency_ms(i);
        }
        let snap = metrics.snapshot();
        // 仅保留最近100个采样（50..150）/ Only the last 100 samples remain
        assert_eq!(snap.average_latency_ms, (50..150).sum::<u64>() as f64 / 100.0);
    }

    #[test]
    fn typing_tracker_set_remove_list() {
        let typing = TypingTracker::new();
        typing.start("bob", "alice");
        typing.start("bob", "carol");
        typing.start("dave", "alice");
        assert_eq!(typing.senders_for("bob"), vec!["alice", "carol"]);

        assert!(typing.stop("bob", "alice"));
        assert!(!typing.stop("bob", "alice"));
        assert_eq!(typing.senders_for("bob"), vec!["carol"]);

        assert_eq!(typing.remove_everywhere("alice"), vec!["dave"]);
        assert!(typing.senders_for("dave").is_empty());
    }
}
