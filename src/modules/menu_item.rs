//! 菜品模块
//! Menu item module

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::web;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::api_success;
use crate::error::{ApiResponse, AppError, AppResult};
use crate::repo::{EntityMeta, GetAllOptions, MutationOptions, RelationField};
use crate::state::AppState;
use crate::store::Validator;

pub const META: EntityMeta = EntityMeta {
    collection: "menu_items",
    relations: &[
        RelationField {
            field: "outletId",
            collection: "outlets",
        },
        RelationField {
            field: "categoryId",
            collection: "categories",
        },
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    // 原样保留客户端数字表示，整数不得退化为浮点
    // Keeps the client's numeric representation; integers must not
    // degrade to floats
    pub price: Number,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

pub fn validator() -> Validator {
    Arc::new(|doc: &Value| {
        let name = doc.get("name").and_then(Value::as_str).unwrap_or("");
        if name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        match doc.get("price").and_then(Value::as_f64) {
            Some(price) if price >= 0.0 => Ok(()),
            Some(_) => Err("price must not be negative".to_string()),
            None => Err("price is required".to_string()),
        }
    })
}

async fn create(
    state: web::Data<AppState>,
    body: web::Json<MenuItem>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let doc = serde_json::to_value(body.into_inner()).map_err(anyhow::Error::from)?;
    let created = state
        .menu_items()
        .create(doc, MutationOptions::default())
        .await?;
    api_success!(created)
}

async fn list(
    state: web::Data<AppState>,
    query: web::Query<HashMap<String, String>>,
) -> AppResult<web::Json<ApiResponse<crate::query::QueryOutput>>> {
    let out = state
        .menu_items()
        .get_all(&query.into_inner(), GetAllOptions::default())
        .await?;
    api_success!(out)
}

async fn get_by_id(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let doc = state
        .menu_items()
        .get_by_id(&path.into_inner(), MutationOptions::default())
        .await?;
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
    let updated = state
        .menu_items()
        .update_by_id(&path.into_inner(), patch, MutationOptions::default())
        .await?;
    api_success!(updated)
}

async fn remove(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let deleted = state
        .menu_items()
        .delete_by_id(&path.into_inner(), None)
        .await?;
    api_success!(deleted)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/menu-items")
            .route("", web::post().to(create))
            .route("", web::get().to(list))
            .route("/{id}", web::get().to(get_by_id))
            .route("/{id}", web::put().to(update))
            .route("/{id}", web::delete().to(remove)),
    );
}
