//! 库存随机修改器
//!
//! 从现有库存中无放回地随机抽取若干条，重新分配 SKU、数量和修改时间，
//! 并在单个事务内写回。

use chrono::NaiveDateTime;
use stock_shared::error::Result;
use stock_shared::observability::metrics;
use tracing::{info, instrument};

use crate::generators::SharedFaker;
use crate::models::StockRecord;
use crate::store::StockRepository;

/// 随机修改器
#[derive(Clone)]
pub struct StockMutator {
    repo: StockRepository,
    faker: SharedFaker,
}

impl StockMutator {
    pub fn new(repo: StockRepository, faker: SharedFaker) -> Self {
        Self { repo, faker }
    }

    /// 随机修改 `amount` 条库存
    ///
    /// 请求数量超过现有记录数时只修改现有记录，不报错。
    /// 返回修改后的记录，顺序与抽样顺序一致。
    #[instrument(skip(self, now))]
    pub async fn mutate(&self, amount: usize, now: NaiveDateTime) -> Result<Vec<StockRecord>> {
        let ids = self.repo.all_ids().await?;

        let updated: Vec<StockRecord> = {
            let mut faker = self.faker.lock();
            faker
                .sample_indices(ids.len(), amount)
                .into_iter()
                .map(|idx| StockRecord {
                    id: ids[idx],
                    sku: faker.sku(),
                    value: faker.value(),
                    modified_since: faker.last_month(now),
                })
                .collect()
        };

        if updated.is_empty() {
            return Ok(updated);
        }

        self.repo.update_batch(&updated).await?;

        metrics::record_rows_mutated(updated.len());
        info!(
            requested = amount,
            available = ids.len(),
            changed = updated.len(),
            "库存已随机修改"
        );

        Ok(updated)
    }
}
