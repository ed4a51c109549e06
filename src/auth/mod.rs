//! 认证组件
//! Authentication components
//!
//! 令牌服务与凭证校验器都是接缝上的特征对象：控制器只依赖抽象，
//! 具体实现可替换。口令散列本身不在本层职责内。
//! The token service and credential verifier are trait objects at the
//! seams: controllers depend on the abstraction, implementations are
//! swappable. Password hashing itself is not this layer's concern.

pub mod token;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub use token::HmacTokenService;

/// 令牌承载的身份声明
/// Identity claims carried by a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub role: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

pub trait TokenService: Send + Sync {
    fn issue(&self, claims: &Claims, kind: TokenKind) -> AppResult<String>;
    fn verify(&self, token: &str, kind: TokenKind) -> AppResult<Claims>;
}

/// 不透明的凭证校验协作方
/// Opaque credential verification collaborator
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, identifier: &str, secret: &str) -> AppResult<bool>;
}
