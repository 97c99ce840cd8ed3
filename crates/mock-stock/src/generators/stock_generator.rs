//! 库存批量生成器
//!
//! 按批生成假库存并逐批落库，同时以流的形式把已落库的记录交给调用方，
//! 调用方可以边生成边输出。内存中同时存在的生成记录不超过一个批次。

use chrono::NaiveDateTime;
use futures::{Stream, StreamExt, TryStreamExt, stream};
use stock_shared::error::{Result, StockError};
use stock_shared::observability::metrics;
use tracing::{debug, info};

use crate::generators::SharedFaker;
use crate::models::{NewStock, StockRecord};
use crate::store::StockRepository;

/// 计算各批次大小
///
/// 除最后一批外每批 `batch_size` 条；最后一批为余数，整除时为完整一批
pub fn batch_sizes(amount: usize, batch_size: usize) -> Vec<usize> {
    if batch_size == 0 {
        return Vec::new();
    }
    let full = amount / batch_size;
    let rest = amount % batch_size;

    let mut sizes = vec![batch_size; full];
    if rest > 0 {
        sizes.push(rest);
    }
    sizes
}

/// 批量生成器
#[derive(Clone)]
pub struct StockGenerator {
    repo: StockRepository,
    faker: SharedFaker,
    batch_size: usize,
}

/// 流式生成过程中的状态
struct GenerationState {
    repo: StockRepository,
    faker: SharedFaker,
    batch_size: usize,
    remaining: usize,
    batch_index: usize,
    now: NaiveDateTime,
}

impl StockGenerator {
    /// 创建生成器，批大小必须大于 0
    pub fn new(repo: StockRepository, faker: SharedFaker, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(StockError::invalid_argument(
                "batch_size",
                "must be at least 1",
            ));
        }
        Ok(Self {
            repo,
            faker,
            batch_size,
        })
    }

    /// 生成 `amount` 条记录
    ///
    /// 每个批次先在一个事务内落库，再把带 id 的记录逐条产出。
    /// 任一批次写库失败时流以该错误结束，后续批次不再生成，已提交的批次保留。
    pub fn stream(
        &self,
        amount: usize,
        now: NaiveDateTime,
    ) -> impl Stream<Item = Result<StockRecord>> + Send + 'static {
        info!(
            amount,
            batch_size = self.batch_size,
            batches = batch_sizes(amount, self.batch_size).len(),
            "开始生成库存数据"
        );

        let state = GenerationState {
            repo: self.repo.clone(),
            faker: self.faker.clone(),
            batch_size: self.batch_size,
            remaining: amount,
            batch_index: 0,
            now,
        };

        stream::try_unfold(state, |mut state| async move {
            if state.remaining == 0 {
                return Ok::<_, StockError>(None);
            }

            let size = state.remaining.min(state.batch_size);
            let batch: Vec<NewStock> = {
                let mut faker = state.faker.lock();
                (0..size).map(|_| faker.new_stock(state.now)).collect()
            };

            let inserted = state.repo.insert_batch(batch).await?;

            state.remaining -= size;
            state.batch_index += 1;
            metrics::record_rows_generated(size);
            debug!(
                batch = state.batch_index,
                size,
                remaining = state.remaining,
                "库存批次已落库"
            );

            Ok(Some((inserted, state)))
        })
        .map_ok(|batch| stream::iter(batch.into_iter().map(Ok::<_, StockError>)))
        .try_flatten()
    }

    /// 生成并落库，不保留记录，返回生成数量
    pub async fn populate(&self, amount: usize, now: NaiveDateTime) -> Result<usize> {
        let stream = self.stream(amount, now);
        futures::pin_mut!(stream);

        let mut generated = 0;
        while let Some(record) = stream.next().await {
            record?;
            generated += 1;
        }
        Ok(generated)
    }
}
