//! 统一可观测性模块
//!
//! 提供 metrics、logging 的统一初始化和管理。
//! 所有入口通过单一入口点配置可观测性，确保一致的指标命名。

pub mod metrics;
pub mod middleware;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// 持有指标导出服务的生命周期，drop 时停止导出。
pub struct ObservabilityGuard {
    metrics_handle: Option<metrics::MetricsHandle>,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self.metrics_handle.take().is_some() {
            info!("Shutting down metrics exporter...");
        }
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics（Prometheus 指标，可选）
///
/// # Example
///
/// ```ignore
/// use stock_shared::config::AppConfig;
/// use stock_shared::observability;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::load("mock-stock")?;
///     let _guard = observability::init(&config.service_name, &config.observability).await?;
///     Ok(())
/// }
/// ```
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        "Observability initialized"
    );

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(service_name, config.metrics_port).await?)
    } else {
        None
    };

    Ok(ObservabilityGuard { metrics_handle })
}
