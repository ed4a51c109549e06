//! 多租户餐饮门店订单后端
//! Multi-tenant food-outlet ordering backend
//!
//! 两个核心子系统：动态查询管道（字符串查询参数 -> 类型化谓词 ->
//! 有序聚合计划）与实时在线/消息中枢（在线登记、离线队列、滑动窗口
//! 限流、输入状态与指标）。
//! Two core subsystems: the dynamic query pipeline (string query params
//! -> typed predicates -> ordered aggregation plan) and the realtime
//! presence/messaging hub (presence registry, offline queue, sliding
//! window rate limiting, typing state and metrics).

pub mod auth;
pub mod bootstrap;
pub mod chat;
pub mod conf;
pub mod error;
pub mod modules;
pub mod query;
pub mod repo;
pub mod state;
pub mod store;
