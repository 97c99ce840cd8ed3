//! 健康检查端点

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::AppState;

/// 存活检查响应
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// 就绪检查响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub database: String,
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}

/// 存活探针：进程正常即返回 healthy
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// 就绪探针：数据库不可用时返回 503
async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready".to_string(),
                database: "ok".to_string(),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "数据库健康检查失败");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "degraded".to_string(),
                    database: "unavailable".to_string(),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestContext;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let ctx = TestContext::new().await;
        let response = ctx.router().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let resp: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.status, "healthy");
    }

    #[tokio::test]
    async fn test_ready_and_degraded() {
        let ctx = TestContext::new().await;
        let response = ctx.router().oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        ctx.state.db.close().await;
        let response = ctx.router().oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let resp: ReadinessResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.status, "degraded");
    }
}
