//! 库存仓储
//!
//! 封装对 stock 表的全部 SQL 访问。连接池由调用方注入，仓储本身可廉价克隆。

use futures::TryStreamExt;
use sqlx::SqlitePool;
use stock_shared::error::{Result, StockError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::models::{NewStock, StockRecord};

/// 全量导出时通道缓冲的记录数
///
/// 缓冲写满后读取任务挂起，由客户端消费速度决定游标推进速度
const EXPORT_CHANNEL_CAPACITY: usize = 256;

/// stock 表仓储
#[derive(Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 清空库存并重置自增序列，下一条记录 id 从 1 开始
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM stock").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'stock'")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("库存表已清空");
        Ok(())
    }

    /// 在单个事务内批量插入，返回带 id 的记录
    pub async fn insert_batch(&self, batch: Vec<NewStock>) -> Result<Vec<StockRecord>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(batch.len());

        for stock in batch {
            let id = sqlx::query("INSERT INTO stock (sku, value, modified_since) VALUES (?, ?, ?)")
                .bind(&stock.sku)
                .bind(stock.value)
                .bind(stock.modified_since)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
            inserted.push(stock.with_id(id));
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// 在单个事务内批量更新 sku、数量和修改时间，id 不变
    pub async fn update_batch(&self, records: &[StockRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            let result =
                sqlx::query("UPDATE stock SET sku = ?, value = ?, modified_since = ? WHERE id = ?")
                    .bind(&record.sku)
                    .bind(record.value)
                    .bind(record.modified_since)
                    .bind(record.id)
                    .execute(&mut *tx)
                    .await?;

            if result.rows_affected() == 0 {
                warn!(id = record.id, "待更新的库存记录不存在");
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// 库存记录总数
    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM stock")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// 全部记录 id，按 id 升序
    pub async fn all_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM stock ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// 按修改时间升序列出全部记录
    pub async fn list_all(&self) -> Result<Vec<StockRecord>> {
        let records = sqlx::query_as::<_, StockRecord>(
            "SELECT id, sku, value, modified_since FROM stock ORDER BY modified_since, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// 按 id 查询
    pub async fn find(&self, id: i64) -> Result<Option<StockRecord>> {
        let record = sqlx::query_as::<_, StockRecord>(
            "SELECT id, sku, value, modified_since FROM stock WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// 按修改时间升序流式读取全部记录
    ///
    /// 读取在独立任务中进行，通过有界通道交给调用方；
    /// 接收端被丢弃时读取任务随之结束并归还连接。
    pub fn stream_all(&self) -> ReceiverStream<Result<StockRecord>> {
        let (tx, rx) = mpsc::channel(EXPORT_CHANNEL_CAPACITY);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let mut rows = sqlx::query_as::<_, StockRecord>(
                "SELECT id, sku, value, modified_since FROM stock ORDER BY modified_since, id",
            )
            .fetch(&pool);

            loop {
                let item = match rows.try_next().await {
                    Ok(Some(record)) => Ok(record),
                    Ok(None) => break,
                    Err(e) => Err(StockError::from(e)),
                };
                let failed = item.is_err();

                if tx.send(item).await.is_err() {
                    debug!("导出接收端已关闭，停止读取");
                    break;
                }
                if failed {
                    break;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}
