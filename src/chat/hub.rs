//! 实时中枢
//! Realtime hub
//!
//! 持有全部显式注入的登记表（连接、在线、离线队列、限流、指标、
//! 输入状态）并分发客户端事件。畸形载荷与限流拒绝只回送 error
//! 事件，绝不终止连接。
//! Owns all explicitly injected registries (connections, presence,
//! offline queue, rate limiter, metrics, typing) and dispatches client
//! events. Malformed payloads and rate-limit denials only echo an error
//! event, never terminate the connection.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::conf::ChatConfig;

use super::events::{ClientEvent, ServerEvent};
use super::message::{self, ChatMessage};
use super::metrics::{ChatMetrics, TypingTracker};
use super::presence::Presence;
use super::queue::OfflineQueue;
use super::rate_limit::RateLimiter;

pub struct Connection {
    pub conn_id: String,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
    pub connected_at: DateTime<Utc>,
}

/// 投递结果 / Delivery outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Queued,
}

pub struct ChatHub {
    config: ChatConfig,
    connections: DashMap<String, Connection>,
    presence: Presence,
    queue: OfflineQueue,
    limiter: RateLimiter,
    metrics: ChatMetrics,
    typing: TypingTracker,
}

impl ChatHub {
    pub fn new(config: ChatConfig) -> Self {
        let queue = OfflineQueue::new(config.queue_capacity);
        let limiter = RateLimiter::new(config.rate_window_ms, config.rate_max_events);
        Self {
            config,
            connections: DashMap::new(),
            presence: Presence::new(),
            queue,
            limiter,
            metrics: ChatMetrics::new(),
            typing: TypingTracker::new(),
        }
    }

    pub fn metrics(&self) -> &ChatMetrics {
        &self.metrics
    }

    /// 传输层接入新连接
    /// Transport attaches a new connection
    pub fn connect(&self, conn_id: &str, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.connections.insert(
            conn_id.to_string(),
            Connection {
                conn_id: conn_id.to_string(),
                sender,
                connected_at: Utc::now(),
            },
        );
        self.metrics.connection_opened();
        tracing::debug!(conn_id, "connection attached");
    }

    /// 传输层断开；被取代连接的迟到断开不清理新会话
    /// Transport teardown; a superseded connection's late teardown leaves
    /// the new session alone
    pub fn disconnect(&self, conn_id: &str) {
        if self.connections.remove(conn_id).is_some() {
            self.metrics.connection_closed();
        }
        if let Some(user_id) = self.presence.disconnect(conn_id) {
            self.limiter.forget(&user_id);
            for receiver in self.typing.remove_everywhere(&user_id) {
                self.send_to_user(
                    &receiver,
                    ServerEvent::StoppedTyping {
                        sender_id: user_id.clone(),
                    },
                );
            }
            tracing::info!(user_id, conn_id, "user went offline");
            self.broadcast_online_users();
        }
    }

    pub fn handle(&self, conn_id: &str, event: ClientEvent) {
        match event {
            ClientEvent::Register { user_id } => self.on_register(conn_id, user_id),
            ClientEvent::SendMessage { payload } => self.on_send(conn_id, payload),
            ClientEvent::MarkRead {
                sender_id,
                receiver_id,
                message_ids,
            } => self.on_mark_read(conn_id, sender_id, receiver_id, message_ids),
            ClientEvent::Typing {
                receiver_id,
                sender_id,
            } => {
                let Some(sender_id) = self.resolve_sender(conn_id, sender_id) else {
                    return;
                };
                self.typing.start(&receiver_id, &sender_id);
                self.presence.touch(&sender_id);
                self.send_to_user(&receiver_id, ServerEvent::TypingIndicator { sender_id });
            }
            ClientEvent::StopTyping {
                receiver_id,
                sender_id,
            } => {
                let Some(sender_id) = self.resolve_sender(conn_id, sender_id) else {
                    return;
                };
                if self.typing.stop(&receiver_id, &sender_id) {
                    self.send_to_user(&receiver_id, ServerEvent::StoppedTyping { sender_id });
                }
            }
            ClientEvent::CheckOnline { user_ids } => {
                let statuses: HashMap<String, bool> = user_ids
                    .into_iter()
                    .map(|id| {
                        let online = self.presence.is_online(&id);
                        (id, online)
                    })
                    .collect();
                self.send_to_conn(conn_id, ServerEvent::OnlineStatus { statuses });
            }
            ClientEvent::TypingUsers { receiver_id } => {
                let senders = self.typing.senders_for(&receiver_id);
                self.send_to_conn(conn_id, ServerEvent::TypingUsers { receiver_id, senders });
            }
            ClientEvent::Metrics => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::Metrics {
                        snapshot: self.metrics.snapshot(),
                    },
                );
            }
            ClientEvent::Ping => self.send_to_conn(conn_id, ServerEvent::Pong),
        }
    }

    fn on_register(&self, conn_id: &str, user_id: String) {
        if let Err(reason) = message::validate_user_id(&user_id, &self.config) {
            self.send_error(conn_id, format!("userId {}", reason));
            return;
        }
        if let Some(old_conn) = self.presence.register(&user_id, conn_id) {
            tracing::info!(user_id, old_conn, conn_id, "session superseded");
        }
        self.send_to_conn(
            conn_id,
            ServerEvent::Registered {
                user_id: user_id.clone(),
            },
        );
        // 离线队列按序一次性下发 / Offline queue drains in order, in one shot
        for queued in self.queue.drain(&user_id) {
            self.send_to_conn(conn_id, ServerEvent::Message { message: queued });
            self.metrics.message_delivered();
        }
        tracing::info!(user_id, conn_id, "user registered");
        self.broadcast_online_users();
    }

    fn on_send(&self, conn_id: &str, payload: message::MessagePayload) {
        let started = Instant::now();
        let Some(sender_id) = self.presence.user_of_conn(conn_id) else {
            self.send_error(conn_id, "register before sending messages".to_string());
            return;
        };
        if !self.limiter.allow(&sender_id) {
            self.send_error(conn_id, "rate limit exceeded, slow down".to_string());
            return;
        }
        if let Err(reason) = message::validate(&payload, &self.config) {
            self.send_error(conn_id, reason);
            return;
        }

        let msg = message::enrich(payload, &self.config);
        self.metrics.message_sent();
        self.presence.touch(&sender_id);

        let outcome = self.deliver(msg.clone());
        let reply = match outcome {
            Delivery::Delivered => ServerEvent::Delivered {
                message_id: msg.message_id,
                receiver_id: msg.receiver_id,
            },
            Delivery::Queued => ServerEvent::Queued {
                message_id: msg.message_id,
                receiver_id: msg.receiver_id,
            },
        };
        self.send_to_conn(conn_id, reply);
        self.metrics
            .record_latency_ms(started.elapsed().as_millis() as u64);
    }

    /// 在线即投递，否则入离线队列
    /// Deliver when online, queue otherwise
    fn deliver(&self, msg: ChatMessage) -> Delivery {
        let receiver_id = msg.receiver_id.clone();
        let sender_id = msg.sender_id.clone();
        if let Some(receiver_conn) = self.presence.conn_of(&receiver_id) {
            // 新消息到达即清除该发送者的输入指示
            // An arriving message clears the sender's typing indicator
            if self.typing.stop(&receiver_id, &sender_id) {
                self.send_to_conn(&receiver_conn, ServerEvent::StoppedTyping { sender_id });
            }
            self.send_to_conn(&receiver_conn, ServerEvent::Message { message: msg });
            self.metrics.message_delivered();
            Delivery::Delivered
        } else {
            if let Some(evicted) = self.queue.enqueue(msg) {
                tracing::warn!(
                    receiver_id,
                    evicted = evicted.message_id,
                    "offline queue full, oldest message dropped"
                );
            }
            Delivery::Queued
        }
    }

    /// 逐条回执并回应读取方；接收方即读取方
    /// Receipts each id back to the sender and acks the reader; the
    /// receiver side is the reader
    fn on_mark_read(
        &self,
        conn_id: &str,
        sender_id: String,
        receiver_id: String,
        message_ids: Vec<String>,
    ) {
        if self.presence.user_of_conn(conn_id).is_none() {
            self.send_error(conn_id, "register before marking messages read".to_string());
            return;
        }
        self.presence.touch(&receiver_id);
        for message_id in message_ids {
            self.metrics.message_read();
            self.send_to_user(
                &sender_id,
                ServerEvent::ReadReceipt {
                    message_id: message_id.clone(),
                    reader_id: receiver_id.clone(),
                },
            );
            self.send_to_conn(conn_id, ServerEvent::ReadAck { message_id });
        }
    }

    /// senderId缺省时回退到连接已注册的用户；两者皆无则回送错误
    /// Falls back to the connection's registered user; neither present
    /// echoes an error
    fn resolve_sender(&self, conn_id: &str, sender_id: Option<String>) -> Option<String> {
        if let Some(explicit) = sender_id {
            return Some(explicit);
        }
        let resolved = self.presence.user_of_conn(conn_id);
        if resolved.is_none() {
            self.send_error(conn_id, "register or supply senderId".to_string());
        }
        resolved
    }

    fn broadcast_online_users(&self) {
        let users = self.presence.online_users();
        for conn in self.connections.iter() {
            let _ = conn.sender.send(ServerEvent::OnlineUsers { users: users.clone() });
        }
    }

    fn send_to_conn(&self, conn_id: &str, event: ServerEvent) {
        if let Some(conn) = self.connections.get(conn_id) {
            // 接收端已关闭时丢弃，由读循环负责清理
            // Dropped when the receiving side is gone; the read loop cleans up
            let _ = conn.sender.send(event);
        }
    }

    fn send_to_user(&self, user_id: &str, event: ServerEvent) {
        if let Some(conn_id) = self.presence.conn_of(user_id) {
            self.send_to_conn(&conn_id, event);
        }
    }

    fn send_error(&self, conn_id: &str, message: String) {
        tracing::debug!(conn_id, message, "client error echoed");
        self.send_to_conn(conn_id, ServerEvent::Error { message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::MessagePayload;

    fn hub() -> ChatHub {
        ChatHub::new(ChatConfig::default())
    }

    fn attach(hub: &ChatHub, conn_id: &str) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.connect(conn_id, tx);
        rx
    }

    fn register(hub: &ChatHub, conn_id: &str, user_id: &str) {
        hub.handle(
            conn_id,
            ClientEvent::Register {
                user_id: user_id.to_string(),
            },
        );
    }

    fn payload(sender: &str, receiver: &str, text: &str) -> MessagePayload {
        MessagePayload {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            text: Some(text.to_string()),
            file: None,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn online_delivery_reaches_the_receiver() {
        let hub = hub();
        let mut alice = attach(&hub, "c1");
        let mut bob = attach(&hub, "c2");
        register(&hub, "c1", "alice");
        register(&hub, "c2", "bob");
        drain(&mut alice);
        drain(&mut bob);

        hub.handle("c1", ClientEvent::SendMessage { payload: payload("alice", "bob", "hi") });

        let bob_events = drain(&mut bob);
        assert!(matches!(
            &bob_events[0],
            ServerEvent::Message { message } if message.text.as_deref() == Some("hi")
        ));
        let alice_events = drain(&mut alice);
        assert!(matches!(&alice_events[0], ServerEvent::Delivered { .. }));
    }

    #[tokio::test]
    async fn offline_messages_queue_and_drain_on_register() {
        let hub = hub();
        let mut alice = attach(&hub, "c1");
        register(&hub, "c1", "alice");
        drain(&mut alice);

        for text in ["one", "two"] {
            hub.handle("c1", ClientEvent::SendMessage { payload: payload("alice", "bob", text) });
        }
        let alice_events = drain(&mut alice);
        assert!(alice_events.iter().all(|e| matches!(e, ServerEvent::Queued { .. })));

        let mut bob = attach(&hub, "c2");
        register(&hub, "c2", "bob");
        let bob_events = drain(&mut bob);
        assert!(matches!(&bob_events[0], ServerEvent::Registered { .. }));
        let texts: Vec<_> = bob_events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::Message { message } => message.text.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn unregistered_send_and_rate_limit_echo_errors() {
        let config = ChatConfig { rate_max_events: 1, ..ChatConfig::default() };
        let hub = ChatHub::new(config);
        let mut alice = attach(&hub, "c1");

        hub.handle("c1", ClientEvent::SendMessage { payload: payload("alice", "bob", "hi") });
        assert!(matches!(&drain(&mut alice)[0], ServerEvent::Error { .. }));

        register(&hub, "c1", "alice");
        drain(&mut alice);
        hub.handle("c1", ClientEvent::SendMessage { payload: payload("alice", "bob", "one") });
        hub.handle("c1", ClientEvent::SendMessage { payload: payload("alice", "bob", "two") });
        let events = drain(&mut alice);
        assert!(matches!(&events[0], ServerEvent::Queued { .. }));
        assert!(matches!(&events[1], ServerEvent::Error { .. }));
    }

    #[tokio::test]
    async fn supersede_keeps_one_presence_entry() {
        let hub = hub();
        let mut first = attach(&hub, "c1");
        register(&hub, "c1", "alice");
        let _second = attach(&hub, "c2");
        register(&hub, "c2", "alice");
        drain(&mut first);

        // 旧连接断开不得使alice下线 / Old teardown must not take alice offline
        hub.disconnect("c1");
        let mut probe = attach(&hub, "c3");
        hub.handle("c3", ClientEvent::CheckOnline { user_ids: vec!["alice".to_string()] });
        let events = drain(&mut probe);
        let ServerEvent::OnlineStatus { statuses } = &events[0] else {
            panic!("expected online-status")
        };
        assert_eq!(statuses.get("alice"), Some(&true));
    }

    #[tokio::test]
    async fn typing_flows_to_the_receiver_and_clears_on_message() {
        let hub = hub();
        let mut alice = attach(&hub, "c1");
        let mut bob = attach(&hub, "c2");
        register(&hub, "c1", "alice");
        register(&hub, "c2", "bob");
        drain(&mut alice);
        drain(&mut bob);

        // senderId省略时取注册身份 / Omitted senderId resolves to the registered user
        hub.handle("c1", ClientEvent::Typing {
            receiver_id: "bob".to_string(),
            sender_id: None,
        });
        assert!(matches!(
            &drain(&mut bob)[0],
            ServerEvent::TypingIndicator { sender_id } if sender_id == "alice"
        ));

        hub.handle("c1", ClientEvent::SendMessage { payload: payload("alice", "bob", "hi") });
        let events = drain(&mut bob);
        assert!(matches!(&events[0], ServerEvent::StoppedTyping { .. }));
        assert!(matches!(&events[1], ServerEvent::Message { .. }));
    }

    #[tokio::test]
    async fn mark_read_receipts_both_sides() {
        let hub = hub();
        let mut alice = attach(&hub, "c1");
        let mut bob = attach(&hub, "c2");
        register(&hub, "c1", "alice");
        register(&hub, "c2", "bob");
        drain(&mut alice);
        drain(&mut bob);

        hub.handle("c2", ClientEvent::MarkRead {
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            message_ids: vec!["m1".to_string(), "m2".to_string()],
        });
        let receipts: Vec<_> = drain(&mut alice)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::ReadReceipt { message_id, reader_id } if reader_id == "bob" => {
                    Some(message_id)
                }
                _ => None,
            })
            .collect();
        assert_eq!(receipts, vec!["m1", "m2"]);
        let acks: Vec<_> = drain(&mut bob)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::ReadAck { message_id } => Some(message_id),
                _ => None,
            })
            .collect();
        assert_eq!(acks, vec!["m1", "m2"]);
        assert_eq!(hub.metrics().snapshot().messages_read, 2);
    }

    #[tokio::test]
    async fn mark_read_requires_registration() {
        let hub = hub();
        let mut alice = attach(&hub, "c1");
        let mut stranger = attach(&hub, "c9");
        register(&hub, "c1", "alice");
        drain(&mut alice);
        drain(&mut stranger);

        hub.handle("c9", ClientEvent::MarkRead {
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            message_ids: vec!["m1".to_string()],
        });
        assert!(matches!(&drain(&mut stranger)[0], ServerEvent::Error { .. }));
        assert!(drain(&mut alice).is_empty());
        assert_eq!(hub.metrics().snapshot().messages_read, 0);
    }

    #[tokio::test]
    async fn metrics_count_the_message_lifecycle() {
        let hub = hub();
        let mut alice = attach(&hub, "c1");
        let mut bob = attach(&hub, "c2");
        register(&hub, "c1", "alice");
        register(&hub, "c2", "bob");
        drain(&mut alice);
        drain(&mut bob);

        hub.handle("c1", ClientEvent::SendMessage { payload: payload("alice", "bob", "hi") });
        let snap = hub.metrics().snapshot();
        assert_eq!(snap.messages_sent, 1);
        assert_eq!(snap.messages_delivered, 1);
        assert_eq!(snap.active_connections, 2);
    }

    #[tokio::test]
    async fn queue_flush_counts_as_delivered() {
        let hub = hub();
        let mut alice = attach(&hub, "c1");
        register(&hub, "c1", "alice");
        drain(&mut alice);

        for text in ["one", "two"] {
            hub.handle("c1", ClientEvent::SendMessage { payload: payload("alice", "bob", text) });
        }
        assert_eq!(hub.metrics().snapshot().messages_delivered, 0);

        let mut bob = attach(&hub, "c2");
        register(&hub, "c2", "bob");
        drain(&mut bob);

        let snap = hub.metrics().snapshot();
        assert_eq!(snap.messages_sent, 2);
        assert_eq!(snap.messages_delivered, 2);
    }
}
