//! Mock Stock CLI
//!
//! 库存模拟服务的命令行入口点。

use clap::Parser;
use mock_stock::cli::{Cli, CommandRunner, Commands};
use stock_shared::config::AppConfig;
use stock_shared::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load("mock-stock")?;
    // 命令行日志级别覆盖配置文件，RUST_LOG 仍然优先
    if let Some(level) = cli.log_level.clone() {
        config.observability.log_level = level;
    }

    let _guard = observability::init(&config.service_name, &config.observability).await?;

    let runner = CommandRunner::new(config);

    match cli.command {
        Commands::Server {
            port,
            database_url,
            populate,
        } => {
            runner.run_server(port, database_url, populate).await?;
        }
        Commands::Populate {
            amount,
            database_url,
            output,
        } => {
            runner.run_populate(amount, database_url, output).await?;
        }
    }

    Ok(())
}
