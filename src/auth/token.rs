//! HMAC令牌服务
//! HMAC token service
//!
//! 令牌为 `hex(载荷JSON).hex(HMAC-SHA256签名)` 两段。载荷携带身份
//! 声明、种类与到期时间；校验为常量时间签名比较加到期检查。
//! Tokens are the two-part `hex(payload JSON).hex(HMAC-SHA256 tag)`.
//! The payload carries the claims, the token kind and the expiry;
//! verification is a constant-time tag check plus an expiry check.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::conf::TokenConfig;
use crate::error::{AppError, AppResult};

use super::{Claims, TokenKind, TokenService};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    #[serde(flatten)]
    claims: Claims,
    kind: TokenKind,
    exp: i64,
}

pub struct HmacTokenService {
    config: TokenConfig,
}

impl HmacTokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    fn ttl_secs(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.config.access_ttl_secs,
            TokenKind::Refresh => self.config.refresh_ttl_secs,
        }
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .map_err(|_| AppError::auth("token secret unusable"))
    }
}

impl TokenService for HmacTokenService {
    fn issue(&self, claims: &Claims, kind: TokenKind) -> AppResult<String> {
        let payload = TokenPayload {
            claims: claims.clone(),
            kind,
            exp: Utc::now().timestamp() + self.ttl_secs(kind),
        };
        let json = serde_json::to_vec(&payload).map_err(anyhow::Error::from)?;
        let mut mac = self.mac()?;
        mac.update(&json);
        let tag = mac.finalize().into_bytes();
        Ok(format!("{}.{}", hex::encode(json), hex::encode(tag)))
    }

    fn verify(&self, token: &str, kind: TokenKind) -> AppResult<Claims> {
        let (payload_hex, tag_hex) = token
            .split_once('.')
            .ok_or_else(|| AppError::auth("malformed token"))?;
        let json = hex::decode(payload_hex).map_err(|_| AppError::auth("malformed token"))?;
        let tag = hex::decode(tag_hex).map_err(|_| AppError::auth("malformed token"))?;

        let mut mac = self.mac()?;
        mac.update(&json);
        mac.verify_slice(&tag)
            .map_err(|_| AppError::auth("token signature mismatch"))?;

        let payload: TokenPayload =
            serde_json::from_slice(&json).map_err(|_| AppError::auth("malformed token"))?;
        if payload.kind != kind {
            return Err(AppError::auth("wrong token kind"));
        }
        if payload.exp <= Utc::now().timestamp() {
            return Err(AppError::auth("token expired"));
        }
        Ok(payload.claims)
    }
}
