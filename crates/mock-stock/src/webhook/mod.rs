//! Webhook 回放
//!
//! `dispatcher` 负责一次回放的分组与节奏，`queue` 负责把回放放到后台执行。

mod dispatcher;
mod queue;

pub use dispatcher::{
    DispatchJob, DispatchOptions, DispatchReport, WebhookDispatcher, WebhookPayload,
};
pub use queue::{DispatchQueue, DrainSummary, QueueShutdown};
