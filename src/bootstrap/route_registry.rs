//! 路由注册表
//! Route registry
//!
//! 各资源模块以配置函数的形式登记路由，统一挂载到 `/api` 之下；
//! 健康检查挂在根路径。
//! Resource modules register routes as configuration functions, all
//! mounted under `/api`; the health check lives at the root.

use actix_web::web;
use serde_json::{json, Value};

use crate::error::ApiResponse;
use crate::modules::{admin, category, menu_item, outlet, owner, user};

/// 路由配置函数类型 / Route configuration function type
pub type RouteConfigFn = fn(&mut web::ServiceConfig);

pub fn module_routes() -> Vec<(&'static str, RouteConfigFn)> {
    vec![
        ("admin", admin::configure),
        ("owner", owner::configure),
        ("outlet", outlet::configure),
        ("category", category::configure),
        ("menu_item", menu_item::configure),
        ("user", user::configure),
    ]
}

async fn health() -> web::Json<ApiResponse<Value>> {
    web::Json(ApiResponse::success(json!({ "status": "ok" })))
}

/// 配置全部全局路由
/// Configure every global route
pub fn configure_global_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));

    let mut api = web::scope("/api");
    for (module, config_fn) in module_routes() {
        tracing::debug!(module, "routes mounted");
        api = api.configure(config_fn);
    }
    cfg.service(api);
}
