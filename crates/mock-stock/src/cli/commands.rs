//! CLI 命令定义
//!
//! 使用 clap derive 宏定义命令行接口结构。

use clap::{Parser, Subcommand};

/// 库存模拟服务命令行工具
///
/// 使用 `--help` 查看各子命令的详细说明。
#[derive(Parser, Debug)]
#[command(name = "mock-stock")]
#[command(version, about = "库存模拟服务：生成假库存、随机修改并回放 Webhook")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)，RUST_LOG 优先
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 子命令枚举
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 启动 HTTP 服务
    ///
    /// 未指定的参数使用配置文件或环境变量中的值。
    Server {
        /// 服务端口
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite 数据库地址，如 sqlite://stock.db
        #[arg(long)]
        database_url: Option<String>,

        /// 启动前重置库存并生成指定数量的记录
        #[arg(long)]
        populate: Option<usize>,
    },

    /// 重置库存并生成数据，不启动服务
    ///
    /// 生成结果以 CSV 输出到文件或标准输出。
    Populate {
        /// 生成数量
        #[arg(short, long)]
        amount: usize,

        /// SQLite 数据库地址
        #[arg(long)]
        database_url: Option<String>,

        /// 输出文件（CSV），缺省时写到标准输出
        #[arg(short, long)]
        output: Option<String>,
    },
}
