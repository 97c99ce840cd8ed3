//! 测试工具模块
//!
//! 提供单元测试和集成测试共用的辅助：内存库路由上下文、
//! 样例数据以及记录 Webhook 请求的本地 HTTP 服务。

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    routing::post,
};
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use stock_shared::database::Database;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::app::build_router;
use crate::generators::StockFaker;
use crate::models::StockRecord;
use crate::state::AppState;
use crate::webhook::{DispatchQueue, DrainSummary, QueueShutdown, WebhookDispatcher, WebhookPayload};

/// 测试用固定种子
pub const TEST_SEED: u64 = 7;

/// 测试用固定时间 2024-06-15T10:00:00
pub fn test_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 15)
        .and_then(|d| d.and_hms_opt(10, 0, 0))
        .expect("固定测试时间合法")
}

/// 生成 id 为 1..=n 的样例记录（不落库）
pub fn sample_records(n: usize) -> Vec<StockRecord> {
    let mut faker = StockFaker::seeded(TEST_SEED);
    (1..=n as i64)
        .map(|id| faker.new_stock(test_now()).with_id(id))
        .collect()
}

// ==================== 路由上下文 ====================

/// 基于内存 SQLite 的完整应用上下文
pub struct TestContext {
    pub state: Arc<AppState>,
    shutdown: Option<QueueShutdown>,
}

impl TestContext {
    /// 空库存
    pub async fn new() -> Self {
        let db = Database::connect_in_memory()
            .await
            .expect("创建内存数据库失败");
        let dispatcher =
            WebhookDispatcher::new(Duration::from_secs(5)).expect("创建 HTTP 客户端失败");
        let (queue, shutdown) = DispatchQueue::start(dispatcher);

        let state = AppState::new(db, StockFaker::seeded(TEST_SEED).shared(), 100, queue)
            .expect("创建应用状态失败");

        Self {
            state: Arc::new(state),
            shutdown: Some(shutdown),
        }
    }

    /// 预先生成 `rows` 条库存
    pub async fn with_rows(rows: usize) -> Self {
        let ctx = Self::new().await;
        ctx.state
            .generator
            .populate(rows, test_now())
            .await
            .expect("预填充库存失败");
        ctx
    }

    /// 构建挂载完整中间件的路由
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// 关闭回放队列并等待后台任务结束
    pub async fn drain_queue(&mut self, timeout: Duration) -> DrainSummary {
        match self.shutdown.take() {
            Some(shutdown) => shutdown.shutdown(timeout).await,
            None => DrainSummary::default(),
        }
    }
}

/// 构造表单 POST 请求
pub fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("构造请求失败")
}

/// 读取完整响应体为字符串
pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("读取响应体失败");
    String::from_utf8(bytes.to_vec()).expect("响应体不是 UTF-8")
}

// ==================== Webhook 记录服务 ====================

struct RecorderState {
    payloads: Mutex<Vec<WebhookPayload>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    status: StatusCode,
    delay: Duration,
}

/// 本地 Webhook 目标
///
/// 记录收到的每个请求体和最大并发数，drop 时停止服务
pub struct WebhookRecorder {
    addr: SocketAddr,
    state: Arc<RecorderState>,
    server: JoinHandle<()>,
}

impl WebhookRecorder {
    /// 立即返回 200
    pub async fn start() -> Self {
        Self::start_with(StatusCode::OK, Duration::ZERO).await
    }

    /// 每个请求处理 `delay` 后返回 `status`
    pub async fn start_with(status: StatusCode, delay: Duration) -> Self {
        let state = Arc::new(RecorderState {
            payloads: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            status,
            delay,
        });

        let app = Router::new()
            .route("/hook", post(record))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("绑定本地端口失败");
        let addr = listener.local_addr().expect("读取本地地址失败");

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    /// 已收到的请求体
    pub fn received(&self) -> Vec<WebhookPayload> {
        self.state.payloads.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.state.payloads.lock().len()
    }

    /// 观察到的最大同时处理请求数
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// 等待至少收到 `n` 个请求，超时返回 false
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.count() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count() >= n
    }
}

impl Drop for WebhookRecorder {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn record(
    State(state): State<Arc<RecorderState>>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    state.payloads.lock().push(payload);
    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    state.status
}
