//! HTTP 服务模块
//!
//! 各端点按职责拆分，由 [`crate::app::build_router`] 合并为一个应用。

pub mod health_service;
pub mod receiver_service;
pub mod stock_service;

pub use health_service::health_routes;
pub use receiver_service::receiver_routes;
pub use stock_service::stock_routes;
