//! 门店模块
//! Outlet module

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::web;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiResponse, AppError, AppResult};
use crate::repo::{EntityMeta, GetAllOptions, MutationOptions, RelationField};
use crate::state::AppState;
use crate::store::Validator;
use crate::api_success;

pub const META: EntityMeta = EntityMeta {
    collection: "outlets",
    relations: &[RelationField {
        field: "ownerId",
        collection: "owners",
    }],
};

/// 地理坐标 / Geo coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// active / closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

pub fn validator() -> Validator {
    Arc::new(|doc: &Value| {
        let name = doc.get("name").and_then(Value::as_str).unwrap_or("");
        if name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        Ok(())
    })
}

async fn create(
    state: web::Data<AppState>,
    body: web::Json<Outlet>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let doc = serde_json::to_value(body.into_inner()).map_err(anyhow::Error::from)?;
    let created = state
        .outlets()
        .create(doc, MutationOptions::default())
        .await?;
    api_success!(created)
}

async fn list(
    state: web::Data<AppState>,
    query: web::Query<HashMap<String, String>>,
) -> AppResult<web::Json<ApiResponse<crate::query::QueryOutput>>> {
    let out = state
        .outlets()
        .get_all(&query.into_inner(), GetAllOptions::default())
        .await?;
    api_success!(out)
}

async fn get_by_id(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let doc = state
        .outlets()
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
        .outlets()
        .update_by_id(&path.into_inner(), patch, MutationOptions::default())
        .await?;
    api_success!(updated)
}

async fn remove(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let deleted = state.outlets().delete_by_id(&path.into_inner(), None).await?;
    api_success!(deleted)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/outlets")
            .route("", web::post().to(create))
            .route("", web::get().to(list))
            .route("/{id}", web::get().to(get_by_id))
            .route("/{id}", web::put().to(update))
            .route("/{id}", web::delete().to(remove)),
    );
}
