//! CSV 流式编码
//!
//! 先输出表头，再为每条记录输出一行，列顺序固定为 id,sku,value,modified_since。
//! 编码按需进行，不会把完整输出缓存在内存中。

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt, stream};
use serde::Serialize;
use stock_shared::error::{Result, StockError};

use crate::models::StockRecord;

/// CSV 表头行
pub const CSV_HEADER: &str = "id,sku,value,modified_since\n";

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

#[derive(Serialize)]
struct CsvRow<'a> {
    id: i64,
    sku: &'a str,
    value: i32,
    modified_since: String,
}

/// 编码单行（含换行符）
pub fn csv_line(record: &StockRecord) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(64));

    writer.serialize(CsvRow {
        id: record.id,
        sku: &record.sku,
        value: record.value,
        modified_since: record.modified_since_iso(),
    })?;

    let bytes = writer
        .into_inner()
        .map_err(|e| StockError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| StockError::Csv(e.to_string()))
}

/// 把记录流转换为 CSV 文本块流
///
/// 上游错误原样向下传递
pub fn csv_stream<S>(records: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = Result<StockRecord>>,
{
    stream::once(async { Ok(CSV_HEADER.to_string()) })
        .chain(records.map(|record| record.and_then(|r| csv_line(&r))))
}

/// 以 `text/csv` 流式响应输出记录
pub fn csv_response<S>(records: S) -> Response
where
    S: Stream<Item = Result<StockRecord>> + Send + 'static,
{
    let body = Body::from_stream(csv_stream(records));
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, CSV_CONTENT_TYPE)],
        body,
    )
        .into_response()
}
