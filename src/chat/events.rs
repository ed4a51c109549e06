//! 实时事件面
//! Realtime event surface
//!
//! 入站/出站事件是封闭的带标签枚举，JSON线格式为
//! `{"type": "event-name", ...fields}`。
//! Inbound/outbound events are closed tagged enums; the JSON wire form is
//! `{"type": "event-name", ...fields}`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::message::{ChatMessage, MessagePayload};
use super::metrics::MetricsSnapshot;

/// 客户端到服务端事件
/// Client-to-server events
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Register { user_id: String },
    SendMessage {
        #[serde(flatten)]
        payload: MessagePayload,
    },
    /// receiverId是读取方；messageIds缺省为空列表
    /// receiverId is the reading side; messageIds defaults to empty
    #[serde(rename_all = "camelCase")]
    MarkRead {
        sender_id: String,
        receiver_id: String,
        #[serde(default)]
        message_ids: Vec<String>,
    },
    /// senderId缺省时取连接已注册的用户
    /// senderId falls back to the connection's registered user
    #[serde(rename_all = "camelCase")]
    Typing {
        receiver_id: String,
        #[serde(default)]
        sender_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    StopTyping {
        receiver_id: String,
        #[serde(default)]
        sender_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CheckOnline { user_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    TypingUsers { receiver_id: String },
    Metrics,
    Ping,
}

/// 服务端到客户端事件
/// Server-to-client events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Registered { user_id: String },
    Message {
        #[serde(flatten)]
        message: ChatMessage,
    },
    #[serde(rename_all = "camelCase")]
    Delivered {
        message_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Queued {
        message_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ReadReceipt {
        message_id: String,
        reader_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ReadAck { message_id: String },
    #[serde(rename_all = "camelCase")]
    TypingIndicator { sender_id: String },
    #[serde(rename_all = "camelCase")]
    StoppedTyping { sender_id: String },
    OnlineUsers { users: Vec<String> },
    OnlineStatus { statuses: HashMap<String, bool> },
    #[serde(rename_all = "camelCase")]
    TypingUsers {
        receiver_id: String,
        senders: Vec<String>,
    },
    Metrics { snapshot: MetricsSnapshot },
    Error { message: String },
    Pong,
}
