//! 聊天消息模型与校验
//! Chat message model and validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::conf::ChatConfig;

/// 入站消息载荷（客户端提交形态）
/// Inbound message payload (client-submitted shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub text: Option<String>,
    /// 文件附件元数据，原样透传 / File attachment metadata, passed through
    #[serde(default)]
    pub file: Option<Value>,
}

/// 充实后的消息（平台分配ID与时间戳）
/// Enriched message (platform-assigned id and timestamp)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// 校验入站载荷；失败消息回送给发起连接
/// Validate an inbound payload; failures go back to the origin connection
pub fn validate(payload: &MessagePayload, config: &ChatConfig) -> Result<(), String> {
    validate_user_id(&payload.sender_id, config).map_err(|e| format!("senderId {}", e))?;
    validate_user_id(&payload.receiver_id, config).map_err(|e| format!("receiverId {}", e))?;

    let has_text = payload.text.as_deref().map(|t| !t.is_empty()).unwrap_or(false);
    let has_file = payload.file.is_some();
    match (has_text, has_file) {
        (false, false) => return Err("message requires text or file".to_string()),
        (true, true) => return Err("message cannot carry both text and file".to_string()),
        _ => {}
    }

    if let Some(text) = &payload.text {
        if text.chars().count() > config.text_max_len {
            return Err(format!("text exceeds {} characters", config.text_max_len));
        }
    }
    Ok(())
}

pub fn validate_user_id(id: &str, config: &ChatConfig) -> Result<(), String> {
    if id.trim().is_empty() {
        return Err("is required".to_string());
    }
    if id.chars().count() > config.max_user_id_len {
        return Err(format!("exceeds {} characters", config.max_user_id_len));
    }
    Ok(())
}

/// 清洗文本：空白折叠为单空格、去首尾、硬截断
/// Sanitize text: collapse whitespace runs, trim, hard cap
pub fn sanitize(text: &str, max_len: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_len).collect()
}

/// 校验通过后的充实：分配消息ID与时间戳
/// Post-validation enrichment: assign message id and timestamp
pub fn enrich(payload: MessagePayload, config: &ChatConfig) -> ChatMessage {
    ChatMessage {
        message_id: Uuid::new_v4().to_string(),
        sender_id: payload.sender_id,
        receiver_id: payload.receiver_id,
        text: payload.text.map(|t| sanitize(&t, config.text_max_len)),
        file: payload.file,
        timestamp: Utc::now(),
    }
}
