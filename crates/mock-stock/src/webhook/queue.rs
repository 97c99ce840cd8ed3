//! 后台回放队列
//!
//! HTTP 处理器只负责把任务投递到队列并立即返回，由单独的 worker
//! 把每个任务放进 JoinSet 执行。不同触发产生的任务彼此并发执行。
//! 关闭时先停止接收，再在限定时间内等待已接收的任务完成，超时后中止剩余任务。

use std::time::Duration;

use stock_shared::error::{Result, StockError};
use stock_shared::observability::metrics;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{error, info, warn};

use super::dispatcher::{DispatchJob, DispatchReport, WebhookDispatcher};

/// 任务投递句柄，可在处理器间克隆共享
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<DispatchJob>,
}

/// worker 关闭句柄，只能使用一次
pub struct QueueShutdown {
    signal: oneshot::Sender<Duration>,
    worker: JoinHandle<DrainSummary>,
}

/// 关闭时的任务统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// 正常结束的任务数
    pub completed: usize,
    /// 等待超时被中止的任务数
    pub aborted: usize,
}

impl DispatchQueue {
    /// 启动 worker，返回投递句柄和关闭句柄
    pub fn start(dispatcher: WebhookDispatcher) -> (Self, QueueShutdown) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (signal, shutdown_rx) = oneshot::channel();

        let worker = tokio::spawn(run_worker(dispatcher, receiver, shutdown_rx));
        info!("Webhook 回放队列已启动");

        (Self { sender }, QueueShutdown { signal, worker })
    }

    /// 投递任务，不等待执行
    ///
    /// 队列已关闭时返回错误
    pub fn submit(&self, job: DispatchJob) -> Result<()> {
        let records = job.records().len();
        let total = job.total_requests();

        self.sender
            .send(job)
            .map_err(|_| StockError::Internal("dispatch queue is closed".to_string()))?;

        info!(records, total_requests = total, "Webhook 回放任务已入队");
        Ok(())
    }

    /// worker 是否已经停止接收
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl QueueShutdown {
    /// 停止接收新任务，最多等待 `drain_timeout` 让已接收的任务结束
    pub async fn shutdown(self, drain_timeout: Duration) -> DrainSummary {
        // worker 已退出时信号发送失败，直接等待其结果
        let _ = self.signal.send(drain_timeout);

        match self.worker.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Webhook 回放 worker 异常退出");
                DrainSummary::default()
            }
        }
    }
}

async fn run_worker(
    dispatcher: WebhookDispatcher,
    mut receiver: mpsc::UnboundedReceiver<DispatchJob>,
    mut shutdown_rx: oneshot::Receiver<Duration>,
) -> DrainSummary {
    let mut jobs: JoinSet<DispatchReport> = JoinSet::new();
    let mut summary = DrainSummary::default();
    let mut shutdown_dropped = false;

    // None 表示所有投递句柄都已释放，此时不设等待上限
    let drain_timeout = loop {
        tokio::select! {
            job = receiver.recv() => match job {
                Some(job) => spawn_job(&mut jobs, &dispatcher, job),
                None => break None,
            },
            Some(result) = jobs.join_next(), if !jobs.is_empty() => {
                finish_job(result, &mut summary);
            }
            signal = &mut shutdown_rx, if !shutdown_dropped => match signal {
                Ok(timeout) => break Some(timeout),
                Err(_) => shutdown_dropped = true,
            },
        }
    };

    receiver.close();
    // 关闭前已入队的任务照常执行
    while let Ok(job) = receiver.try_recv() {
        spawn_job(&mut jobs, &dispatcher, job);
    }

    info!(in_flight = jobs.len(), "Webhook 回放队列停止接收，等待任务结束");

    match drain_timeout {
        Some(timeout) => {
            let drained = tokio::time::timeout(timeout, drain(&mut jobs, &mut summary)).await;
            if drained.is_err() {
                summary.aborted = jobs.len();
                jobs.abort_all();
                while jobs.join_next().await.is_some() {}

                for _ in 0..summary.aborted {
                    metrics::record_webhook_job("aborted");
                }
                warn!(
                    aborted = summary.aborted,
                    timeout_secs = timeout.as_secs_f64(),
                    "等待超时，已中止剩余回放任务"
                );
            }
        }
        None => drain(&mut jobs, &mut summary).await,
    }

    info!(
        completed = summary.completed,
        aborted = summary.aborted,
        "Webhook 回放队列已关闭"
    );
    summary
}

fn spawn_job(jobs: &mut JoinSet<DispatchReport>, dispatcher: &WebhookDispatcher, job: DispatchJob) {
    let dispatcher = dispatcher.clone();
    jobs.spawn(async move { dispatcher.run(&job).await });
}

async fn drain(jobs: &mut JoinSet<DispatchReport>, summary: &mut DrainSummary) {
    while let Some(result) = jobs.join_next().await {
        finish_job(result, summary);
    }
}

fn finish_job(result: std::result::Result<DispatchReport, JoinError>, summary: &mut DrainSummary) {
    match result {
        Ok(report) => {
            summary.completed += 1;
            let outcome = if report.is_all_success() {
                "completed"
            } else {
                "partial"
            };
            metrics::record_webhook_job(outcome);
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => {
            error!(error = %e, "Webhook 回放任务 panic");
            metrics::record_webhook_job("panicked");
        }
    }
}
