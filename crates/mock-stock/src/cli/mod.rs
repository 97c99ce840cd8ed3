//! CLI 模块
//!
//! - `server` - 启动 HTTP 服务
//! - `populate` - 重置库存并生成数据，结果输出为 CSV
//!
//! # 使用示例
//!
//! ```bash
//! # 启动服务并预先生成 1000 条库存
//! mock-stock server --port 8000 --populate 1000
//!
//! # 只生成数据
//! mock-stock populate --amount 5000 -o stock.csv
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands};
pub use runner::CommandRunner;
