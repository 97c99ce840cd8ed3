//! 命令执行器
//!
//! 负责执行各 CLI 子命令的具体逻辑，把命令行参数叠加到已加载的配置上。

use std::fs;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use stock_shared::config::AppConfig;
use stock_shared::database::Database;
use tokio::net::TcpListener;
use tracing::info;

use crate::app::build_router;
use crate::export::csv_stream;
use crate::generators::{StockFaker, StockGenerator};
use crate::state::AppState;
use crate::store::StockRepository;
use crate::webhook::{DispatchQueue, WebhookDispatcher};

/// 命令执行器
pub struct CommandRunner {
    config: AppConfig,
}

impl CommandRunner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// 执行 server 命令
    ///
    /// 关闭顺序：停止接收连接并等待请求结束，排空回放队列，最后关闭连接池
    pub async fn run_server(
        &self,
        port: Option<u16>,
        database_url: Option<String>,
        populate: Option<usize>,
    ) -> Result<()> {
        let mut config = self.config.clone();
        if let Some(port) = port {
            config.server.port = port;
        }
        if let Some(url) = database_url {
            config.database.url = url;
        }
        config.validate()?;

        info!(
            service = %config.service_name,
            environment = %config.environment,
            database = %config.database.url,
            "启动库存模拟服务"
        );

        let db = Database::connect(&config.database)
            .await
            .context("连接数据库失败")?;

        let dispatcher = WebhookDispatcher::new(Duration::from_secs(
            config.webhook.request_timeout_seconds,
        ))?;
        let (queue, queue_shutdown) = DispatchQueue::start(dispatcher);

        let faker = StockFaker::from_seed(config.generator.seed).shared();
        let state = Arc::new(AppState::new(
            db.clone(),
            faker,
            config.generator.batch_size,
            queue,
        )?);

        if let Some(amount) = populate {
            info!(amount, "预填充库存");
            state.repo.reset().await?;
            let generated = state
                .generator
                .populate(amount, Utc::now().naive_utc())
                .await?;
            info!(generated, "库存预填充完成");
        }

        let app = build_router(state);

        let listener = TcpListener::bind(config.server_addr())
            .await
            .context("绑定端口失败")?;

        info!("库存模拟服务已启动: http://{}", config.server_addr());
        info!("可用端点:");
        info!("  GET  / - 导出全部库存 (CSV)");
        info!("  POST /trigger/ - 随机修改库存并回放 Webhook");
        info!("  POST /initialize-stock/ - 重置并生成库存");
        info!("  POST /receiver/ - Webhook 接收端");
        info!("  GET  /health, /ready - 健康检查");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("服务器运行失败")?;

        let summary = queue_shutdown
            .shutdown(Duration::from_secs(config.webhook.drain_timeout_seconds))
            .await;
        info!(
            completed = summary.completed,
            aborted = summary.aborted,
            "回放队列已排空"
        );

        db.close().await;
        info!("库存模拟服务已停止");
        Ok(())
    }

    /// 执行 populate 命令
    ///
    /// 重置库存后逐批生成，生成结果同步写出为 CSV
    pub async fn run_populate(
        &self,
        amount: usize,
        database_url: Option<String>,
        output: Option<String>,
    ) -> Result<()> {
        let mut config = self.config.clone();
        if let Some(url) = database_url {
            config.database.url = url;
        }
        config.validate()?;

        info!(amount, database = %config.database.url, "批量生成库存");

        let db = Database::connect(&config.database)
            .await
            .context("连接数据库失败")?;
        let repo = StockRepository::new(db.pool().clone());
        let faker = StockFaker::from_seed(config.generator.seed).shared();
        let generator = StockGenerator::new(repo.clone(), faker, config.generator.batch_size)?;

        repo.reset().await?;

        let sink: Box<dyn Write> = match output.as_deref() {
            Some(path) => Box::new(fs::File::create(path).context("创建输出文件失败")?),
            None => Box::new(io::stdout()),
        };
        let mut writer = BufWriter::new(sink);

        let chunks = csv_stream(generator.stream(amount, Utc::now().naive_utc()));
        futures::pin_mut!(chunks);

        while let Some(chunk) = chunks.next().await {
            writer
                .write_all(chunk?.as_bytes())
                .context("写入 CSV 失败")?;
        }
        writer.flush().context("写入 CSV 失败")?;

        if let Some(path) = output {
            info!(path, "数据已输出到文件");
        }

        let count = repo.count().await?;
        info!(count, "库存生成完成");
        db.close().await;
        Ok(())
    }
}

/// 等待关闭信号（Ctrl+C 或 SIGTERM）
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到 Ctrl+C，正在停止服务..."),
        _ = terminate => info!("收到 SIGTERM，正在停止服务..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CSV_HEADER;

    fn temp_db_url(name: &str) -> (String, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "mock-stock-{}-{}.db",
            name,
            std::process::id()
        ));
        (format!("sqlite://{}", path.display()), path)
    }

    #[tokio::test]
    async fn test_run_populate_writes_csv() {
        let (url, db_path) = temp_db_url("populate");
        let output = std::env::temp_dir().join(format!("mock-stock-{}.csv", std::process::id()));

        let mut config = AppConfig::default();
        config.generator.batch_size = 4;
        config.generator.seed = Some(3);
        let runner = CommandRunner::new(config);

        runner
            .run_populate(10, Some(url), Some(output.display().to_string()))
            .await
            .unwrap();

        let csv = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(format!("{}\n", lines[0]), CSV_HEADER);
        assert_eq!(lines.len(), 11);
        assert!(lines[10].starts_with("10,"));

        let _ = fs::remove_file(&output);
        let _ = fs::remove_file(&db_path);
        let _ = fs::remove_file(db_path.with_extension("db-wal"));
        let _ = fs::remove_file(db_path.with_extension("db-shm"));
    }

    #[tokio::test]
    async fn test_run_populate_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.generator.batch_size = 0;
        let runner = CommandRunner::new(config);

        assert!(runner.run_populate(1, None, None).await.is_err());
    }
}
