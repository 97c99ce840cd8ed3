//! 库存记录模型
//!
//! 对应 SQLite 中的 stock 表，一条记录表示一个 SKU 的库存数量。

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 库存数量上限（含）
pub const MAX_STOCK_VALUE: i32 = 200;

/// 时间戳的 ISO-8601 文本格式（秒级精度）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 已持久化的库存记录
///
/// `id` 由数据库分配，分配后不再变化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StockRecord {
    pub id: i64,
    pub sku: String,
    pub value: i32,
    pub modified_since: NaiveDateTime,
}

/// 尚未落库的库存记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStock {
    pub sku: String,
    pub value: i32,
    pub modified_since: NaiveDateTime,
}

impl NewStock {
    /// 绑定数据库分配的 id
    pub fn with_id(self, id: i64) -> StockRecord {
        StockRecord {
            id,
            sku: self.sku,
            value: self.value,
            modified_since: self.modified_since,
        }
    }
}

impl StockRecord {
    /// ISO-8601 格式的修改时间
    pub fn modified_since_iso(&self) -> String {
        self.modified_since.format(TIMESTAMP_FORMAT).to_string()
    }
}
