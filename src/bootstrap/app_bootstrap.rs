//! 应用启动器
//! Application bootstrap
//!
//! 初始化日志、构建共享状态、并行拉起HTTP服务与实时监听。
//! Initializes logging, builds shared state, and brings up the HTTP
//! server and the realtime listener side by side.

use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use crate::chat;
use crate::conf::AppConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::route_registry::configure_global_routes;

/// 初始化日志订阅器（重复调用安全）
/// Initialize the log subscriber (safe to call repeatedly)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new("vfood-rust".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub struct AppBootstrap {
    config: AppConfig,
}

impl AppBootstrap {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> AppResult<()> {
        let config = self.config;
        info!(
            host = config.server.host,
            port = config.server.port,
            ws = config.chat.listen,
            "starting servers"
        );

        let state = web::Data::new(AppState::new(config.clone()));

        // 实时监听与HTTP服务并行运行
        // The realtime listener runs alongside the HTTP server
        let hub = state.hub.clone();
        let ws_listen = config.chat.listen.clone();
        tokio::spawn(async move {
            if let Err(err) = chat::ws::run(hub, &ws_listen).await {
                error!(error = %err, "realtime listener failed");
            }
        });

        let mut server = HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .app_data(state.clone())
                .configure(configure_global_routes)
        });
        if let Some(workers) = config.server.workers {
            server = server.workers(workers);
        }

        server
            .bind((config.server.host.as_str(), config.server.port))
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?
            .run()
            .await
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

        Ok(())
    }
}
