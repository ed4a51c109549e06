//! 实时在线与消息核心
//! Realtime presence and messaging core
//!
//! 中枢持有全部登记表并由配置注入构建；传输层只负责帧与JSON事件的
//! 往返。所有守恒量（队列容量、限流窗口、文本上限）来自 `ChatConfig`。
//! The hub owns every registry and is built by config injection; the
//! transport layer only shuttles frames and JSON events. All bounds
//! (queue capacity, rate window, text cap) come from `ChatConfig`.

pub mod events;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod queue;
pub mod rate_limit;
pub mod ws;

pub use events::{ClientEvent, ServerEvent};
pub use hub::{ChatHub, Delivery};
pub use message::{ChatMessage, MessagePayload};
pub use metrics::{ChatMetrics, MetricsSnapshot, TypingTracker};
pub use presence::Presence;
pub use queue::OfflineQueue;
pub use rate_limit::RateLimiter;
