//! 导出模块
//!
//! 把库存记录序列增量编码为 CSV 文本。

pub mod csv_stream;

pub use csv_stream::{CSV_HEADER, csv_line, csv_response, csv_stream};
