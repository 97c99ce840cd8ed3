//! 日志初始化模块
//!
//! 基于 tracing-subscriber 构建日志输出，支持人类可读与 JSON 两种格式。

use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// 构建环境过滤器
///
/// 优先使用 RUST_LOG，其次使用配置中的级别，都无效时回退到 info
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化 tracing 日志
///
/// 全局 subscriber 只能安装一次，重复调用返回错误。
/// 日志写到 stderr，stdout 留给 CSV 输出。
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.log_level))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
