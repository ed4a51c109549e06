//! 离线消息队列
//! Offline message queue
//!
//! 每个接收者一条有界FIFO队列。满时丢弃最旧一条而非拒绝新消息；
//! 接收者注册时一次性按序取空。
//! One bounded FIFO queue per receiver. When full the oldest entry is
//! dropped, never the incoming one; the receiver's registration drains
//! the queue in order in one shot.

use std::collections::VecDeque;

use dashmap::DashMap;

use super::message::ChatMessage;

pub struct OfflineQueue {
    queues: DashMap<String, VecDeque<ChatMessage>>,
    capacity: usize,
}

impl OfflineQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// 入队；返回被驱逐的最旧消息（如有）
    /// Enqueue; returns the evicted oldest message, if any
    pub fn enqueue(&self, message: ChatMessage) -> Option<ChatMessage> {
        let mut queue = self.queues.entry(message.receiver_id.clone()).or_default();
        queue.push_back(message);
        if queue.len() > self.capacity {
            queue.pop_front()
        } else {
            None
        }
    }

    /// 取空并移除该接收者的队列
    /// Drain and remove the receiver's queue
    pub fn drain(&self, receiver_id: &str) -> Vec<ChatMessage> {
        self.queues
            .remove(receiver_id)
            .map(|(_, queue)| queue.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, receiver_id: &str) -> usize {
        self.queues.get(receiver_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, receiver_id: &str) -> bool {
        self.len(receiver_id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(receiver: &str, text: &str) -> ChatMessage {
        ChatMessage {
            message_id: text.to_string(),
            sender_id: "alice".to_string(),
            receiver_id: receiver.to_string(),
            text: Some(text.to_string()),
            file: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn overflow_evicts_the_oldest() {
        let queue = OfflineQueue::new(3);
        for i in 0..4 {
            let evicted = queue.enqueue(message("bob", &format!("m{}", i)));
            if i < 3 {
                assert!(evicted.is_none());
            } else {
                assert_eq!(evicted.unwrap().message_id, "m0");
            }
        }
        assert_eq!(queue.len("bob"), 3);
        let drained: Vec<String> = queue.drain("bob").into_iter().map(|m| m.message_id).collect();
        assert_eq!(drained, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn drain_is_fifo_and_removes_the_entry() {
        let queue = OfflineQueue::new(50);
        queue.enqueue(message("bob", "first"));
        queue.enqueue(message("bob", "second"));
        let drained = queue.drain("bob");
        assert_eq!(drained[0].message_id, "first");
        assert_eq!(drained[1].message_id, "second");
        assert!(queue.is_empty("bob"));
        assert!(queue.drain("bob").is_empty());
    }

    #[test]
    fn queues_are_per_receiver() {
        let queue = OfflineQueue::new(50);
        queue.enqueue(message("bob", "for-bob"));
        queue.enqueue(message("carol", "for-carol"));
        assert_eq!(queue.len("bob"), 1);
        assert_eq!(queue.len("carol"), 1);
        queue.drain("bob");
        assert_eq!(queue.len("carol"), 1);
    }
}
