//! 路由共享状态

use stock_shared::database::Database;
use stock_shared::error::Result;

use crate::generators::{SharedFaker, StockGenerator, StockMutator};
use crate::store::StockRepository;
use crate::webhook::DispatchQueue;

/// 所有处理器共享的服务状态
///
/// 连接池在启动时创建后显式注入，不使用全局变量
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub repo: StockRepository,
    pub generator: StockGenerator,
    pub mutator: StockMutator,
    pub dispatch: DispatchQueue,
}

impl AppState {
    pub fn new(
        db: Database,
        faker: SharedFaker,
        batch_size: usize,
        dispatch: DispatchQueue,
    ) -> Result<Self> {
        let repo = StockRepository::new(db.pool().clone());
        let generator = StockGenerator::new(repo.clone(), faker.clone(), batch_size)?;
        let mutator = StockMutator::new(repo.clone(), faker);

        Ok(Self {
            db,
            repo,
            generator,
            mutator,
            dispatch,
        })
    }
}
