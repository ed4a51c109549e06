//! 引导层
//! Bootstrap layer

pub mod app_bootstrap;
pub mod command_registry;
pub mod route_registry;

pub use app_bootstrap::{init_tracing, AppBootstrap};
pub use command_registry::build_app;
pub use route_registry::configure_global_routes;
