//! Webhook 回放分发器
//!
//! 把一组库存记录按并发宽度分组，组内并发 POST，组间顺序执行并按配置休眠，
//! 整个过程可重复多轮。单个请求失败只记录日志和指标，不重试。

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use stock_shared::error::{Result, StockError};
use stock_shared::observability::metrics;
use tracing::{debug, info, instrument, warn};

use crate::models::StockRecord;

/// 出站请求体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: i64,
    pub sku: String,
    pub value: i32,
    pub modified_since: String,
}

impl From<&StockRecord> for WebhookPayload {
    fn from(record: &StockRecord) -> Self {
        Self {
            id: record.id,
            sku: record.sku.clone(),
            value: record.value,
            modified_since: record.modified_since_iso(),
        }
    }
}

/// 回放参数
///
/// 只能通过 [`DispatchOptions::new`] 构造，构造成功即表示参数合法
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    url: Url,
    concurrency: NonZeroUsize,
    delay: Duration,
    duplicate: u32,
}

impl DispatchOptions {
    /// 校验并构造回放参数
    ///
    /// - `url` 必须是 http/https 绝对地址
    /// - `concurrency` 至少为 1，为 0 时分组为空，回放无法正常结束
    /// - `sleep_secs` 为组间休眠秒数，必须是非负有限数
    pub fn new(url: &str, concurrency: usize, sleep_secs: f64, duplicate: u32) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| StockError::invalid_argument("webhook_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(StockError::invalid_argument(
                "webhook_url",
                format!("unsupported scheme: {}", url.scheme()),
            ));
        }

        let (concurrency, delay) = Self::validate_pacing(concurrency, sleep_secs)?;

        Ok(Self {
            url,
            concurrency,
            delay,
            duplicate,
        })
    }

    /// 只校验并发宽度和组间休眠，不涉及目标地址
    pub fn validate_pacing(concurrency: usize, sleep_secs: f64) -> Result<(NonZeroUsize, Duration)> {
        let concurrency = NonZeroUsize::new(concurrency)
            .ok_or_else(|| StockError::invalid_argument("concurrency", "must be at least 1"))?;

        let delay = Duration::try_from_secs_f64(sleep_secs).map_err(|_| {
            StockError::invalid_argument("sleep", "must be a non-negative finite number")
        })?;

        Ok((concurrency, delay))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn duplicate(&self) -> u32 {
        self.duplicate
    }

    /// 总轮数（首轮加重复次数）
    pub fn passes(&self) -> u64 {
        u64::from(self.duplicate) + 1
    }
}

/// 一次回放任务
///
/// 任务只存在于后台回放期间，由执行它的分发器独占
#[derive(Debug, Clone)]
pub struct DispatchJob {
    options: DispatchOptions,
    records: Vec<StockRecord>,
}

impl DispatchJob {
    pub fn new(options: DispatchOptions, records: Vec<StockRecord>) -> Self {
        Self { options, records }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn records(&self) -> &[StockRecord] {
        &self.records
    }

    /// 每轮的分组数
    pub fn groups_per_pass(&self) -> usize {
        self.records.len().div_ceil(self.options.concurrency())
    }

    /// 预期发出的请求总数
    pub fn total_requests(&self) -> u64 {
        self.records.len() as u64 * self.options.passes()
    }
}

/// 回放结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// 完成的轮数
    pub passes: u64,
    /// 发送的分组数（所有轮合计）
    pub groups: usize,
    /// 发出的请求数
    pub sent: usize,
    /// 2xx 响应数
    pub succeeded: usize,
    /// 非 2xx 或网络错误数
    pub failed: usize,
}

impl DispatchReport {
    /// 是否全部成功
    pub fn is_all_success(&self) -> bool {
        self.failed == 0
    }

    /// 成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.sent == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.sent as f64) * 100.0
        }
    }
}

/// Webhook 分发器
///
/// 内部的 reqwest Client 自带连接池，克隆开销很小
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
}

impl WebhookDispatcher {
    /// 使用指定的单请求超时创建
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StockError::Internal(format!("创建 HTTP 客户端失败: {e}")))?;
        Ok(Self { client })
    }

    /// 执行回放
    ///
    /// 组内请求全部结束（成功或失败）后才进入下一组，
    /// 每组结束后休眠配置的时长，轮与轮之间严格串行。
    #[instrument(
        skip(self, job),
        fields(
            url = %job.options.url,
            records = job.records.len(),
            concurrency = job.options.concurrency(),
            passes = job.options.passes()
        )
    )]
    pub async fn run(&self, job: &DispatchJob) -> DispatchReport {
        let options = &job.options;
        let mut report = DispatchReport::default();

        for pass in 0..options.passes() {
            for (group_idx, group) in job.records.chunks(options.concurrency()).enumerate() {
                let results = join_all(
                    group
                        .iter()
                        .map(|record| self.send_one(&options.url, record)),
                )
                .await;

                report.groups += 1;
                for ok in results {
                    report.sent += 1;
                    if ok {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }

                debug!(pass, group = group_idx, size = group.len(), "分组发送完成");

                if !options.delay.is_zero() {
                    tokio::time::sleep(options.delay).await;
                }
            }
            report.passes += 1;
        }

        info!(
            sent = report.sent,
            succeeded = report.succeeded,
            failed = report.failed,
            success_rate = format!("{:.1}%", report.success_rate()),
            "Webhook 回放完成"
        );

        report
    }

    /// 发送单条记录，返回是否得到 2xx 响应
    async fn send_one(&self, url: &Url, record: &StockRecord) -> bool {
        let payload = WebhookPayload::from(record);
        let start = Instant::now();

        let result = self.client.post(url.clone()).json(&payload).send().await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(response) if response.status().is_success() => {
                metrics::record_webhook_request("success", elapsed);
                true
            }
            Ok(response) => {
                warn!(
                    id = record.id,
                    status = response.status().as_u16(),
                    "Webhook 返回非成功状态"
                );
                metrics::record_webhook_request("http_error", elapsed);
                false
            }
            Err(e) => {
                warn!(id = record.id, error = %e, "Webhook 请求失败");
                metrics::record_webhook_request("transport_error", elapsed);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{WebhookRecorder, sample_records};
    use axum::http::StatusCode;

    fn dispatcher() -> WebhookDispatcher {
        WebhookDispatcher::new(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_options_validation() {
        assert!(DispatchOptions::new("http://localhost:9000/hook", 1, 0.0, 0).is_ok());

        let err = DispatchOptions::new("http://localhost:9000/hook", 0, 0.0, 0).unwrap_err();
        assert!(matches!(err, StockError::InvalidArgument { ref field, .. } if field == "concurrency"));

        let err = DispatchOptions::new("http://localhost:9000/hook", 1, -0.5, 0).unwrap_err();
        assert!(matches!(err, StockError::InvalidArgument { ref field, .. } if field == "sleep"));

        assert!(DispatchOptions::new("http://localhost:9000/hook", 1, f64::NAN, 0).is_err());
        assert!(DispatchOptions::new("http://localhost:9000/hook", 1, f64::INFINITY, 0).is_err());

        let err = DispatchOptions::new("not a url", 1, 0.0, 0).unwrap_err();
        assert!(matches!(err, StockError::InvalidArgument { ref field, .. } if field == "webhook_url"));

        assert!(DispatchOptions::new("ftp://example.com/hook", 1, 0.0, 0).is_err());
    }

    #[test]
    fn test_validate_pacing_without_url() {
        let (concurrency, delay) = DispatchOptions::validate_pacing(5, 1.5).unwrap();
        assert_eq!(concurrency.get(), 5);
        assert_eq!(delay, Duration::from_millis(1500));

        assert!(DispatchOptions::validate_pacing(0, 0.0).is_err());
        assert!(DispatchOptions::validate_pacing(1, -1.0).is_err());
    }

    #[test]
    fn test_options_delay() {
        let options = DispatchOptions::new("https://example.com/hook", 4, 0.25, 2).unwrap();
        assert_eq!(options.delay(), Duration::from_millis(250));
        assert_eq!(options.concurrency(), 4);
        assert_eq!(options.passes(), 3);
    }

    #[test]
    fn test_job_counts() {
        let options = DispatchOptions::new("https://example.com/hook", 3, 0.0, 1).unwrap();
        let job = DispatchJob::new(options, sample_records(7));
        assert_eq!(job.groups_per_pass(), 3);
        assert_eq!(job.total_requests(), 14);
    }

    #[test]
    fn test_payload_from_record() {
        let record = &sample_records(1)[0];
        let payload = WebhookPayload::from(record);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["id"], 1);
        assert_eq!(json["sku"], record.sku.as_str());
        assert_eq!(json["value"], record.value);
        assert_eq!(json["modified_since"], record.modified_since_iso());
    }

    #[test]
    fn test_report_success_rate() {
        let report = DispatchReport {
            passes: 1,
            groups: 2,
            sent: 10,
            succeeded: 8,
            failed: 2,
        };
        assert!(!report.is_all_success());
        assert_eq!(report.success_rate(), 80.0);
        assert_eq!(DispatchReport::default().success_rate(), 100.0);
    }

    #[tokio::test]
    async fn test_run_sends_every_record_each_pass() {
        let recorder = WebhookRecorder::start().await;
        let records = sample_records(5);
        let options = DispatchOptions::new(&recorder.url(), 2, 0.0, 2).unwrap();
        let job = DispatchJob::new(options, records.clone());

        let report = dispatcher().run(&job).await;

        assert_eq!(report.passes, 3);
        assert_eq!(report.groups, 9);
        assert_eq!(report.sent, 15);
        assert_eq!(report.succeeded, 15);
        assert_eq!(recorder.count(), 15);

        // 每条记录在每轮都被发送一次
        let received = recorder.received();
        for record in &records {
            let hits = received.iter().filter(|p| p.id == record.id).count();
            assert_eq!(hits, 3);
        }
    }

    #[tokio::test]
    async fn test_run_bounds_in_flight_requests() {
        let recorder = WebhookRecorder::start_with(StatusCode::OK, Duration::from_millis(50)).await;
        let options = DispatchOptions::new(&recorder.url(), 3, 0.0, 0).unwrap();
        let job = DispatchJob::new(options, sample_records(9));

        let report = dispatcher().run(&job).await;

        assert_eq!(report.groups, 3);
        assert_eq!(recorder.count(), 9);
        assert!(recorder.max_in_flight() <= 3);
        assert!(recorder.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_run_sequential_with_delay() {
        let recorder = WebhookRecorder::start().await;
        let options = DispatchOptions::new(&recorder.url(), 1, 0.05, 0).unwrap();
        let job = DispatchJob::new(options, sample_records(3));

        let start = Instant::now();
        let report = dispatcher().run(&job).await;

        assert_eq!(report.groups, 3);
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert_eq!(recorder.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_run_counts_http_failures() {
        let recorder =
            WebhookRecorder::start_with(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
        let options = DispatchOptions::new(&recorder.url(), 2, 0.0, 0).unwrap();
        let job = DispatchJob::new(options, sample_records(4));

        let report = dispatcher().run(&job).await;

        assert_eq!(report.sent, 4);
        assert_eq!(report.failed, 4);
        assert_eq!(recorder.count(), 4);
    }

    /// 绑定随机端口后立即释放，得到一个当前无人监听的地址
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/hook")
    }

    #[tokio::test]
    async fn test_run_unreachable_target() {
        let options = DispatchOptions::new(&closed_port_url(), 2, 0.0, 0).unwrap();
        let job = DispatchJob::new(options, sample_records(3));

        let report = dispatcher().run(&job).await;
        assert_eq!(report.sent, 3);
        assert_eq!(report.failed, 3);
    }

    #[tokio::test]
    async fn test_run_empty_records() {
        let options = DispatchOptions::new("http://127.0.0.1:9/hook", 2, 1.0, 3).unwrap();
        let job = DispatchJob::new(options, Vec::new());

        let report = dispatcher().run(&job).await;
        assert_eq!(report.passes, 4);
        assert_eq!(report.groups, 0);
        assert_eq!(report.sent, 0);
    }
}
