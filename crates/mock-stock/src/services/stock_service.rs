//! 库存服务
//!
//! 全量导出、随机修改并触发 Webhook 回放、重置并重新生成库存。
//! 三个端点的响应都是流式 CSV。

use std::sync::Arc;

use axum::{
    Form, Router,
    extract::State,
    response::Response,
    routing::{get, post},
};
use chrono::{NaiveDateTime, Utc};
use futures::stream;
use serde::{Deserialize, Deserializer};
use stock_shared::error::StockError;
use tracing::info;

use crate::export::csv_response;
use crate::state::AppState;
use crate::webhook::{DispatchJob, DispatchOptions};

// ============================================================================
// 请求 DTO
// ============================================================================

/// 随机修改请求（表单）
#[derive(Debug, Deserialize)]
pub struct TriggerForm {
    pub number_to_change: usize,
    /// 空字符串视为未提供
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 组间休眠秒数
    #[serde(default)]
    pub sleep: f64,
    #[serde(default)]
    pub duplicate: u32,
}

/// 重置库存请求（表单）
#[derive(Debug, Deserialize)]
pub struct InitializeForm {
    pub amount: usize,
}

fn default_concurrency() -> usize {
    1
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

// ============================================================================
// 路由定义
// ============================================================================

/// 构建库存服务路由
pub fn stock_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(export_stock))
        .route("/trigger/", post(trigger))
        .route("/initialize-stock/", post(initialize_stock))
}

// ============================================================================
// 路由处理器
// ============================================================================

/// 按修改时间升序导出全部库存
///
/// GET /
async fn export_stock(State(state): State<Arc<AppState>>) -> Response {
    info!("导出全部库存");
    csv_response(state.repo.stream_all())
}

/// 随机修改库存，提供 webhook_url 时在后台回放修改结果
///
/// POST /trigger/
///
/// 参数在修改之前校验，校验失败时库存保持不变
async fn trigger(
    State(state): State<Arc<AppState>>,
    Form(form): Form<TriggerForm>,
) -> Result<Response, StockError> {
    let options = match form.webhook_url.as_deref() {
        Some(url) => Some(DispatchOptions::new(
            url,
            form.concurrency,
            form.sleep,
            form.duplicate,
        )?),
        None => {
            DispatchOptions::validate_pacing(form.concurrency, form.sleep)?;
            None
        }
    };

    let changed = state.mutator.mutate(form.number_to_change, now()).await?;

    if let Some(options) = options {
        info!(
            url = %options.url(),
            records = changed.len(),
            concurrency = options.concurrency(),
            duplicate = options.duplicate(),
            "安排 Webhook 回放"
        );
        state
            .dispatch
            .submit(DispatchJob::new(options, changed.clone()))?;
    }

    Ok(csv_response(stream::iter(changed.into_iter().map(Ok))))
}

/// 清空库存并重新生成
///
/// POST /initialize-stock/
///
/// 生成与响应同步推进：每批落库后立即输出
async fn initialize_stock(
    State(state): State<Arc<AppState>>,
    Form(form): Form<InitializeForm>,
) -> Result<Response, StockError> {
    info!(amount = form.amount, "重置库存");
    state.repo.reset().await?;

    Ok(csv_response(state.generator.stream(form.amount, now())))
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CSV_HEADER;
    use crate::test_utils::{TestContext, body_string, form_request};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_initialize_then_export() {
        let ctx = TestContext::new().await;

        let response = ctx
            .router()
            .oneshot(form_request("/initialize-stock/", "amount=5"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(format!("{}\n", lines[0]), CSV_HEADER);
        for (i, line) in lines[1..].iter().enumerate() {
            assert!(line.starts_with(&format!("{},", i + 1)));
        }
        assert_eq!(ctx.state.repo.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_initialize_resets_ids() {
        let ctx = TestContext::with_rows(8).await;

        let response = ctx
            .router()
            .oneshot(form_request("/initialize-stock/", "amount=2"))
            .await
            .unwrap();
        let body = body_string(response).await;

        assert!(body.lines().nth(1).unwrap().starts_with("1,"));
        assert_eq!(ctx.state.repo.all_ids().await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_initialize_requires_amount() {
        let ctx = TestContext::new().await;
        let response = ctx
            .router()
            .oneshot(form_request("/initialize-stock/", "amount=-3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_trigger_without_webhook() {
        let ctx = TestContext::with_rows(10).await;

        let response = ctx
            .router()
            .oneshot(form_request("/trigger/", "number_to_change=3&webhook_url="))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert_eq!(body.lines().count(), 4);
        assert_eq!(ctx.state.repo.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_trigger_zero_concurrency_leaves_store_untouched() {
        let ctx = TestContext::with_rows(5).await;
        let before = ctx.state.repo.list_all().await.unwrap();

        let response = ctx
            .router()
            .oneshot(form_request(
                "/trigger/",
                "number_to_change=3&webhook_url=http://127.0.0.1:9/hook&concurrency=0",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ctx.state.repo.list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_trigger_bad_url_rejected() {
        let ctx = TestContext::with_rows(5).await;
        let before = ctx.state.repo.list_all().await.unwrap();

        let response = ctx
            .router()
            .oneshot(form_request(
                "/trigger/",
                "number_to_change=1&webhook_url=not-a-url",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ctx.state.repo.list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_export_empty_store() {
        let ctx = TestContext::new().await;
        let response = ctx
            .router()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, CSV_HEADER);
    }
}
