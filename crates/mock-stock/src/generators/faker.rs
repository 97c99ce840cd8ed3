//! 库存假数据源
//!
//! 所有随机值都来自同一个可注入种子的 `StdRng`，固定种子即可复现生成结果。

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{MAX_STOCK_VALUE, NewStock};

/// EAN-13 编码长度
pub const SKU_LENGTH: usize = 13;

/// 修改时间回溯窗口（天）
const LAST_MONTH_DAYS: i64 = 30;

/// 进程内共享的假数据源
///
/// 锁只在同步生成数据时持有，不会跨越 await
pub type SharedFaker = Arc<Mutex<StockFaker>>;

/// 库存假数据生成器
#[derive(Debug)]
pub struct StockFaker {
    rng: StdRng,
}

impl StockFaker {
    /// 使用固定种子创建，生成序列可复现
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 使用系统熵源创建
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// 根据可选种子创建
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// 包装为共享实例
    pub fn shared(self) -> SharedFaker {
        Arc::new(Mutex::new(self))
    }

    /// 生成 EAN-13 格式的 SKU
    ///
    /// 前 12 位随机，最后一位为校验位
    pub fn sku(&mut self) -> String {
        let digits: Vec<u8> = (0..SKU_LENGTH - 1)
            .map(|_| self.rng.random_range(0..=9u8))
            .collect();
        let check = ean13_check_digit(&digits);

        digits
            .iter()
            .chain(std::iter::once(&check))
            .map(|d| char::from(b'0' + d))
            .collect()
    }

    /// 随机库存数量，范围 [0, 200]
    pub fn value(&mut self) -> i32 {
        self.rng.random_range(0..=MAX_STOCK_VALUE)
    }

    /// 在 [start, end] 之间均匀取一个秒级时间戳
    pub fn timestamp_between(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> NaiveDateTime {
        let (start, end) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        let start = truncate_to_second(start);
        let span = (end - start).num_seconds().max(0);
        start + Duration::seconds(self.rng.random_range(0..=span))
    }

    /// 当月月初到 `now` 之间的时间戳
    pub fn this_month(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        let month_start = now
            .date()
            .with_day(1)
            .unwrap_or(now.date())
            .and_time(NaiveTime::MIN);
        self.timestamp_between(month_start, now)
    }

    /// 最近一个月（30 天）到 `now` 之间的时间戳
    pub fn last_month(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        self.timestamp_between(now - Duration::days(LAST_MONTH_DAYS), now)
    }

    /// 生成一条新库存记录
    pub fn new_stock(&mut self, now: NaiveDateTime) -> NewStock {
        NewStock {
            sku: self.sku(),
            value: self.value(),
            modified_since: self.this_month(now),
        }
    }

    /// 从 [0, len) 中无放回地均匀抽取至多 `amount` 个下标
    pub fn sample_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        rand::seq::index::sample(&mut self.rng, len, amount.min(len)).into_vec()
    }
}

/// 计算 EAN-13 校验位
///
/// 从左起奇数位权重 1，偶数位权重 3
pub fn ean13_check_digit(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| u32::from(*d) * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// 校验 SKU 是否为合法的 EAN-13 编码
pub fn is_valid_ean13(sku: &str) -> bool {
    if sku.len() != SKU_LENGTH || !sku.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u8> = sku.bytes().map(|b| b - b'0').collect();
    ean13_check_digit(&digits[..SKU_LENGTH - 1]) == digits[SKU_LENGTH - 1]
}

fn truncate_to_second(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(0).unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_check_digit_known_codes() {
        // 4006381333931 为公开的合法 EAN-13 示例
        assert!(is_valid_ean13("4006381333931"));
        assert!(!is_valid_ean13("4006381333932"));
        assert!(!is_valid_ean13("400638133393"));
        assert!(!is_valid_ean13("40063813339a1"));
    }

    #[test]
    fn test_sku_is_valid_ean13() {
        let mut faker = StockFaker::seeded(7);
        for _ in 0..200 {
            let sku = faker.sku();
            assert_eq!(sku.len(), SKU_LENGTH);
            assert!(is_valid_ean13(&sku), "invalid sku {sku}");
        }
    }

    #[test]
    fn test_value_in_range() {
        let mut faker = StockFaker::seeded(1);
        for _ in 0..1000 {
            let v = faker.value();
            assert!((0..=MAX_STOCK_VALUE).contains(&v));
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let now = at(2024, 5, 20, 12);
        let mut a = StockFaker::seeded(42);
        let mut b = StockFaker::seeded(42);
        let left: Vec<NewStock> = (0..20).map(|_| a.new_stock(now)).collect();
        let right: Vec<NewStock> = (0..20).map(|_| b.new_stock(now)).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_this_month_window() {
        let now = at(2024, 5, 20, 12);
        let mut faker = StockFaker::seeded(3);
        for _ in 0..500 {
            let ts = faker.this_month(now);
            assert!(ts >= at(2024, 5, 1, 0));
            assert!(ts <= now);
            assert_eq!(ts.nanosecond(), 0);
        }
    }

    #[test]
    fn test_last_month_window() {
        let now = at(2024, 3, 5, 8);
        let mut faker = StockFaker::seeded(4);
        for _ in 0..500 {
            let ts = faker.last_month(now);
            assert!(ts >= now - Duration::days(30));
            assert!(ts <= now);
        }
    }

    #[test]
    fn test_timestamp_between_swaps_bounds() {
        let mut faker = StockFaker::seeded(5);
        let start = at(2024, 1, 2, 0);
        let end = at(2024, 1, 1, 0);
        let ts = faker.timestamp_between(start, end);
        assert!(ts >= end && ts <= start);
    }

    #[test]
    fn test_sample_indices_capped() {
        let mut faker = StockFaker::seeded(6);
        let picked = faker.sample_indices(5, 10);
        assert_eq!(picked.len(), 5);

        let mut picked = faker.sample_indices(100, 30);
        assert_eq!(picked.len(), 30);
        picked.sort_unstable();
        picked.dedup();
        assert_eq!(picked.len(), 30);
        assert!(picked.iter().all(|i| *i < 100));

        assert!(faker.sample_indices(0, 3).is_empty());
    }
}
