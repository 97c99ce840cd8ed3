//! 生成器模块
//!
//! 提供库存假数据源、批量生成器和随机修改器。

pub mod faker;
pub mod mutator;
pub mod stock_generator;

pub use faker::{SharedFaker, StockFaker, ean13_check_digit, is_valid_ean13};
pub use mutator::StockMutator;
pub use stock_generator::{StockGenerator, batch_sizes};
