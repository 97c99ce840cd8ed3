//! Mock Stock
//!
//! 库存模拟服务，用于测试 Webhook 集成：生成假库存并存入 SQLite，
//! 随机修改一部分记录，以 CSV 流式输出，并可按指定的并发、间隔和重复次数
//! 把修改结果回放到调用方给定的 Webhook 地址。
//!
//! # 主要模块
//!
//! - `generators`: 假数据源、批量生成器和随机修改器
//! - `store`: stock 表仓储
//! - `export`: CSV 流式编码
//! - `webhook`: 回放分发器和后台队列
//! - `services`: HTTP 端点
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use mock_stock::generators::{StockFaker, StockGenerator};
//! use mock_stock::store::StockRepository;
//! use stock_shared::database::Database;
//!
//! # async fn demo() -> stock_shared::error::Result<()> {
//! let db = Database::connect_in_memory().await?;
//! let repo = StockRepository::new(db.pool().clone());
//! let generator = StockGenerator::new(repo, StockFaker::seeded(42).shared(), 1000)?;
//!
//! let now = chrono::Utc::now().naive_utc();
//! generator.populate(2500, now).await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod cli;
pub mod export;
pub mod generators;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod test_utils;
pub mod webhook;
