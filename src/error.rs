use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// 统一的应用错误类型
/// Unified application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("认证错误: {message}")]
    Auth { message: String },

    #[error("权限错误: {message}")]
    Permission { message: String },

    #[error("验证错误: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("资源未找到: {resource}")]
    NotFound { resource: String },

    #[error("查询执行失败: {message}")]
    Query { message: String },

    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// 创建认证错误
    pub fn auth<T: Into<String>>(message: T) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// 创建权限错误
    pub fn permission<T: Into<String>>(message: T) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation<T: Into<String>, U: Into<String>>(field: T, message: U) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found<T: Into<String>>(resource: T) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 创建查询失败错误，保留底层存储的原始消息
    /// Wrap a failed store operation, keeping the original message
    pub fn query<T: Into<String>>(message: T) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// 获取错误代码
    pub fn error_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 1001,
            AppError::Auth { .. } => 1002,
            AppError::Permission { .. } => 1003,
            AppError::Validation { .. } => 1004,
            AppError::NotFound { .. } => 1005,
            AppError::Query { .. } => 1006,
            AppError::Internal(_) => 1000,
        }
    }

    /// 获取HTTP状态码
    pub fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth { .. } => StatusCode::UNAUTHORIZED,
            AppError::Permission { .. } => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Query { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // 记录错误日志
        match self {
            AppError::Internal(_) | AppError::Query { .. } | AppError::Config(_) => {
                tracing::error!("Internal error: {}", message);
            }
            AppError::Auth { .. } | AppError::Permission { .. } => {
                tracing::warn!("Access denied: {}", message);
            }
            _ => {
                tracing::info!("Client error: {}", message);
            }
        }

        let kind = match self {
            AppError::Config(_) => "Config",
            AppError::Auth { .. } => "Auth",
            AppError::Permission { .. } => "Permission",
            AppError::Validation { .. } => "Validation",
            AppError::NotFound { .. } => "NotFound",
            AppError::Query { .. } => "Query",
            AppError::Internal(_) => "Internal",
        };

        HttpResponse::build(status).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
                "type": kind
            },
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 成功响应结构
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// 便捷宏：创建API成功响应
#[macro_export]
macro_rules! api_success {
    ($data:expr) => {
        Ok(actix_web::web::Json($crate::error::ApiResponse::success(
            $data,
        )))
    };
}
