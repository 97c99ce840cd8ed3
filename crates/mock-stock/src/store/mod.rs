//! 存储模块
//!
//! 基于 SQLite 的库存表访问。

pub mod stock_repository;

pub use stock_repository::StockRepository;
