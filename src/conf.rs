use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// HTTP服务配置
/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// 实时通道配置
/// Realtime channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// WebSocket监听地址 / WebSocket listen address
    pub listen: String,
    /// 限流窗口（毫秒）/ Rate limit window in milliseconds
    pub rate_window_ms: i64,
    /// 窗口内每用户最大消息数 / Max messages per user per window
    pub rate_max_events: usize,
    /// 离线队列容量（每用户）/ Offline queue capacity per user
    pub queue_capacity: usize,
    /// 消息文本最大长度 / Max message text length
    pub text_max_len: usize,
    /// 用户ID最大长度 / Max user id length
    pub max_user_id_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9100".to_string(),
            rate_window_ms: 60_000,
            rate_max_events: 100,
            queue_capacity: 50,
            text_max_len: 5000,
            max_user_id_len: 100,
        }
    }
}

/// 令牌服务配置
/// Token service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

/// 应用配置根
/// Application configuration root
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub token: TokenConfig,
}

impl AppConfig {
    /// 按 默认文件 -> 运行模式文件 -> 环境变量 的顺序加载配置
    /// Load configuration layering default file -> run-mode file -> env vars
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("VFOOD").separator("__"))
            .build()?
            .try_deserialize()
    }
}
