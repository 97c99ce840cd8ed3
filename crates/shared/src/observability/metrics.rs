//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。
//! 未安装 recorder 时所有记录函数都是空操作，测试中可直接调用。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Metrics 资源守卫
///
/// drop 时终止指标 HTTP 服务
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册指标描述
///
/// 描述会出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "stock_rows_generated_total",
        "Total number of generated stock rows"
    );
    metrics::describe_counter!(
        "stock_rows_mutated_total",
        "Total number of randomly mutated stock rows"
    );

    metrics::describe_counter!(
        "webhook_requests_total",
        "Total number of outbound webhook requests"
    );
    metrics::describe_histogram!(
        "webhook_request_duration_seconds",
        "Outbound webhook request duration in seconds"
    );
    metrics::describe_counter!("webhook_jobs_total", "Total number of webhook replay jobs");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录生成的库存行数
#[inline]
pub fn record_rows_generated(count: usize) {
    metrics::counter!("stock_rows_generated_total").increment(count as u64);
}

/// 记录被随机修改的库存行数
#[inline]
pub fn record_rows_mutated(count: usize) {
    metrics::counter!("stock_rows_mutated_total").increment(count as u64);
}

/// 记录单个出站 webhook 请求
///
/// outcome: success / http_error / transport_error
#[inline]
pub fn record_webhook_request(outcome: &str, duration_secs: f64) {
    metrics::counter!("webhook_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!(
        "webhook_request_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// 记录回放任务结果
///
/// outcome: completed / partial / aborted / panicked
#[inline]
pub fn record_webhook_job(outcome: &str) {
    metrics::counter!("webhook_jobs_total", "outcome" => outcome.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_http_request("GET", "/", 200, 0.01);
        record_rows_generated(1000);
        record_rows_mutated(3);
        record_webhook_request("success", 0.05);
        record_webhook_request("transport_error", 1.5);
        record_webhook_job("completed");
    }
}
