//! Webhook 接收端
//!
//! 记录收到的原始请求体并原样返回，状态码由调用方通过查询参数指定，
//! 用于观察其他系统发出的 Webhook 内容。

use axum::{
    Router,
    body::Bytes,
    extract::{Query, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use stock_shared::error::StockError;
use tracing::info;

/// 接收端查询参数
#[derive(Debug, Deserialize)]
pub struct ReceiverQuery {
    pub status_code: Option<i64>,
}

/// 构建接收端路由
pub fn receiver_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/receiver/", post(receive))
}

/// 记录并回显请求体
///
/// POST /receiver/?status_code=N
///
/// 非整数的 status_code 与越界取值一样按参数错误返回 422
async fn receive(
    query: Result<Query<ReceiverQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Response, StockError> {
    let Query(query) = query
        .map_err(|rejection| StockError::invalid_argument("status_code", rejection.body_text()))?;
    let status = response_status(query.status_code)?;

    info!(
        status = status.as_u16(),
        bytes = body.len(),
        body = %String::from_utf8_lossy(&body),
        "收到 Webhook 请求"
    );

    Ok((status, body).into_response())
}

/// 解析回显状态码，默认 200
fn response_status(code: Option<i64>) -> Result<StatusCode, StockError> {
    let Some(code) = code else {
        return Ok(StatusCode::OK);
    };

    u16::try_from(code)
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| {
            StockError::invalid_argument("status_code", format!("{code} is not a valid HTTP status"))
        })
}
