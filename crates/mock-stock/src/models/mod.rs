//! 库存数据模型

pub mod stock;

pub use stock::{MAX_STOCK_VALUE, NewStock, StockRecord, TIMESTAMP_FORMAT};
