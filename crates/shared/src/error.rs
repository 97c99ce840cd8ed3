//! 统一错误处理模块
//!
//! 定义系统中所有共享的错误类型，使用 thiserror 提供良好的错误信息。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum StockError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    // ==================== 验证错误 ====================
    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    // ==================== 序列化错误 ====================
    #[error("CSV 序列化失败: {0}")]
    Csv(String),

    // ==================== 通用错误 ====================
    #[error("配置错误: {0}")]
    Config(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, StockError>;

impl StockError {
    /// 构造字段级参数错误
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Csv(_) => "CSV_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 返回对应的 HTTP 状态码
    ///
    /// 参数错误与 axum 表单反序列化失败保持一致，使用 422
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Database(_) | Self::Csv(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<csv::Error> for StockError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

impl From<config::ConfigError> for StockError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl IntoResponse for StockError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Csv(_) | Self::Config(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            _ => self.to_string(),
        };

        let body = json!({
            "code": self.code(),
            "message": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = StockError::Csv("unterminated record".to_string());
        assert_eq!(err.code(), "CSV_ERROR");

        let err = StockError::invalid_argument("sleep", "must not be negative");
        assert_eq!(err.code(), "INVALID_ARGUMENT");
        assert_eq!(err.to_string(), "无效的参数: sleep - must not be negative");
    }

    #[test]
    fn test_status_code() {
        assert_eq!(
            StockError::invalid_argument("concurrency", "must be at least 1").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            StockError::Database(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            StockError::Config("missing port".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_into_response_hides_database_detail() {
        let response = StockError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
