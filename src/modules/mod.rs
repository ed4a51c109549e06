//! 资源模块
//! Resource modules
//!
//! 每个模块一个文件：模型、实体元数据、校验器、控制器与路由配置。
//! 控制器一律经仓库门面访问数据。
//! One file per module: model, entity metadata, validator, controller
//! and route configuration. Controllers go through the repository
//! facade, always.

pub mod admin;
pub mod category;
pub mod menu_item;
pub mod outlet;
pub mod owner;
pub mod user;
