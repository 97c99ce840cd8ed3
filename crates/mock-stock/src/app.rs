//! 应用路由装配

use std::sync::Arc;

use axum::{Router, middleware};
use stock_shared::observability::middleware as obs_middleware;
use tower_http::compression::{
    CompressionLayer, Predicate,
    predicate::{DefaultPredicate, NotForContentType},
};

use crate::services::{health_routes, receiver_routes, stock_routes};
use crate::state::AppState;

/// 合并全部路由并挂载中间件
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(stock_routes())
        .merge(receiver_routes())
        // CSV 按行流式输出，压缩会缓冲分块，因此只压缩其余响应
        .layer(CompressionLayer::new().compress_when(
            DefaultPredicate::new().and(NotForContentType::new("text/csv")),
        ))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
