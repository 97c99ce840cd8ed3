//! 数据库连接管理模块
//!
//! 提供嵌入式 SQLite 连接池管理，支持健康检查和表结构初始化。

use crate::config::DatabaseConfig;
use crate::error::{Result, StockError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// 库存表结构
///
/// AUTOINCREMENT 使 sqlite_sequence 记录自增序列，重置库存时可将序列归零
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stock(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sku TEXT NOT NULL,
        value INTEGER NOT NULL,
        modified_since DATETIME NOT NULL)
    "#,
    "CREATE INDEX IF NOT EXISTS idx_stock_modified_since ON stock(modified_since)",
];

/// 数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// 创建数据库连接池
    ///
    /// 数据库文件不存在时自动创建，并确保表结构就绪
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.connect_timeout_seconds));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!("Database connection pool created");
        Ok(db)
    }

    /// 创建内存数据库
    ///
    /// 内存库的每个连接都是独立数据库，因此连接数固定为 1
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// 建表（幂等）
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(StockError::from)
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}
