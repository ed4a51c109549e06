//! 用户模块与登录
//! User module and login
//!
//! 凭证校验经不透明协作方完成；口令散列不在本层处理，存储中的
//! 口令字段按原样比较。
//! Credential checks go through the opaque collaborator; password
//! hashing is not handled here, the stored password field is compared
//! as-is.

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::web;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api_success;
use crate::auth::{Claims, CredentialVerifier, TokenKind, TokenService};
use crate::error::{ApiResponse, AppError, AppResult};
use crate::query::Stage;
use crate::repo::{EntityMeta, GetAllOptions, MutationOptions};
use crate::state::AppState;
use crate::store::{DocumentStore, Validator};

pub const META: EntityMeta = EntityMeta {
    collection: "users",
    relations: &[],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
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

/// 基于存储的凭证校验协作方
/// Store-backed credential verification collaborator
pub struct StoreCredentials {
    store: Arc<dyn DocumentStore>,
}

impl StoreCredentials {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 邮箱精确匹配，不走查询文法的正则等值路径
    /// Exact email match, bypassing the grammar's regex-equality path
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Value>> {
        let mut cond = Map::new();
        cond.insert("email".to_string(), json!({ "$eq": email }));
        let rows = self
            .store
            .aggregate("users", &[Stage::Match(cond)], None)
            .await
            .map_err(|e| AppError::query(e.to_string()))?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl CredentialVerifier for StoreCredentials {
    async fn verify(&self, identifier: &str, secret: &str) -> AppResult<bool> {
        let Some(user) = self.find_by_email(identifier).await? else {
            return Ok(false);
        };
        Ok(user.get("password").and_then(Value::as_str) == Some(secret))
    }
}

fn strip_password(mut doc: Value) -> Value {
    if let Some(map) = doc.as_object_mut() {
        map.remove("password");
    }
    doc
}

fn claims_of(user: &Value) -> Claims {
    Claims {
        id: user.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
        role: user
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("user")
            .to_string(),
        email: user
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    }
}

async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let LoginRequest { email, password } = body.into_inner();
    if !state.credentials.verify(&email, &password).await? {
        return Err(AppError::auth("invalid credentials"));
    }

    let finder = StoreCredentials::new(state.store.clone());
    let user = finder
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::auth("invalid credentials"))?;

    let claims = claims_of(&user);
    let access_token = state.tokens.issue(&claims, TokenKind::Access)?;
    let refresh_token = state.tokens.issue(&claims, TokenKind::Refresh)?;
    tracing::info!(user_id = claims.id, "user logged in");
    api_success!(json!({
        "user": strip_password(user),
        "accessToken": access_token,
        "refreshToken": refresh_token
    }))
}

async fn refresh(
    state: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let claims = state
        .tokens
        .verify(&body.refresh_token, TokenKind::Refresh)?;
    let access_token = state.tokens.issue(&claims, TokenKind::Access)?;
    api_success!(json!({ "accessToken": access_token }))
}

async fn create(
    state: web::Data<AppState>,
    body: web::Json<User>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let doc = serde_json::to_value(body.into_inner()).map_err(anyhow::Error::from)?;
    let created = state.users().create(doc, MutationOptions::default()).await?;
    api_success!(strip_password(created))
}

async fn list(
    state: web::Data<AppState>,
    query: web::Query<HashMap<String, String>>,
) -> AppResult<web::Json<ApiResponse<crate::query::QueryOutput>>> {
    let opts = GetAllOptions {
        after: Some(Box::new(|rows| {
            rows.into_iter().map(strip_password).collect()
        })),
        ..Default::default()
    };
    let out = state.users().get_all(&query.into_inner(), opts).await?;
    api_success!(out)
}

async fn get_by_id(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let doc = state
        .users()
        .get_by_id(&path.into_inner(), MutationOptions::default())
        .await?;
    api_success!(strip_password(doc))
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
        .users()
        .update_by_id(&path.into_inner(), patch, MutationOptions::default())
        .await?;
    api_success!(strip_password(updated))
}

async fn remove(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<web::Json<ApiResponse<Value>>> {
    let deleted = state.users().delete_by_id(&path.into_inner(), None).await?;
    api_success!(strip_password(deleted))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .route("/login", web::post().to(login))
            .route("/refresh", web::post().to(refresh))
            .route("", web::post().to(create))
            .route("", web::get().to(list))
            .route("/{id}", web::get().to(get_by_id))
            .route("/{id}", web::put().to(update))
            .route("/{id}", web::delete().to(remove)),
    );
}
