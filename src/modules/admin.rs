//! 管理员模块
//! Admin module
//!
//! 列表查询演示联结钩子路径：匹配后联结角色集合并展开，后钩子把
//! 角色对象压平成名称并剥除口令字段。
//! The list query demonstrates the lookup-hook path: a post-match role
//! join plus unwind, with an after hook flattening the role object to
//! its name and stripping the password field.

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::web;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api_success;
use crate::error::{ApiResponse, AppError, AppResult};
use crate::query::Stage;
use crate::repo::{EntityMeta, GetAllOptions, MutationOptions, RelationField};
use crate::state::AppState;
use crate::store::Validator;

pub const META: EntityMeta = EntityMeta {
    collection: "admins",
    relations: &[RelationField {
        field: "roleId",
        collection: "roles",
    }],
};

pub const ROLE_META: EntityMeta = EntityMeta {
    collection: "roles",
    relations: &[],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

pub fn validator() -> Validator {
    Arc::new(|doc: &Value| {
        let email = doc.get("email").and_then(Value::as_str).unwrap_or("");
        if email.trim().is_empty() || !email.contains('@') {
            return Err("a valid email is required".to_string());
        }
        Ok(())
    })
}

/// 联结出的角色对象压平为名称，口令永不外泄
/// Flatten the joined role object to its name; the password never leaks
fn flatten_roles(rows: Vec<Value>) -> Vec<Value> {
    rows.into_iter()
        .map(|mut row| {
            if let Some(map) = row.as_object_mut() {
                map.remove("password");
                if let Some(name) = map
                    .get("role")
                    .and_then(|role| role.get("name"))
                    .cloned()
                {
                    map.insert("role".to_string(), name);
                }
            }
            row
        })
        .collect()
}

async fn create(
    state: web::Data<AppState>,
    body: web::Json<Admin>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let doc = serde_json::to_value(body.into_inner()).map_err(anyhow::Error::from)?;
    let mut created = state
        .admins()
        .create(doc, MutationOptions::default())
        .await?;
    if let Some(map) = created.as_object_mut() {
        map.remove("password");
    }
    api_success!(created)
}

async fn list(
    state: web::Data<AppState>,
    query: web::Query<HashMap<String, String>>,
) -> AppResult<web::Json<ApiResponse<crate::query::QueryOutput>>> {
    let opts = GetAllOptions {
        extra_stages: vec![
            Stage::lookup("roles", "roleId", "id", "role"),
            Stage::Unwind {
                path: "role".to_string(),
            },
        ],
        after: Some(Box::new(flatten_roles)),
        ..Default::default()
    };
    let out = state.admins().get_all(&query.into_inner(), opts).await?;
    api_success!(out)
}

async fn get_by_id(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let mut doc = state
        .admins()
        .get_by_id(&path.into_inner(), MutationOptions::default())
        .await?;
    if let Some(map) = doc.as_object_mut() {
        map.remove("password");
    }
    api_success!(doc)
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let patch = body.into_inner();
    if !patch.is_object() {
        return Err(AppError::validation("body", "patch must be an object"));
    }
    let mut updated = state
        .admins()
        .update_by_id(&path.into_inner(), patch, MutationOptions::default())
        .await?;
    if let Some(map) = updated.as_object_mut() {
        map.remove("password");
    }
    api_success!(updated)
}

async fn remove(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let deleted = state.admins().delete_by_id(&path.into_inner(), None).await?;
    api_success!(deleted)
}

async fn create_role(
    state: web::Data<AppState>,
    body: web::Json<Role>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let doc = serde_json::to_value(body.into_inner()).map_err(anyhow::Error::from)?;
    let created = state
        .roles()
        .create(doc, MutationOptions::default())
        .await?;
    api_success!(created)
}

async fn list_roles(
    state: web::Data<AppState>,
    query: web::Query<HashMap<String, String>>,
) -> AppResult<web::Json<ApiResponse<crate::query::QueryOutput>>> {
    let out = state
        .roles()
        .get_all(&query.into_inner(), GetAllOptions::default())
        .await?;
    api_success!(out)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admins")
            .route("", web::post().to(create))
            .route("", web::get().to(list))
            .route("/{id}", web::get().to(get_by_id))
            .route("/{id}", web::put().to(update))
            .route("/{id}", web::delete().to(remove)),
    );
    cfg.service(
        web::scope("/roles")
            .route("", web::post().to(create_role))
            .route("", web::get().to(list_roles)),
    );
}
