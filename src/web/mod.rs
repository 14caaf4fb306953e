//! HTTP surface: health, manual triggers, URL tests and selector previews.

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::repository::MonitorRepository;
use crate::monitoring::executor::CheckExecutor;

pub mod error;
pub mod payload_cache;
pub mod routes;

pub use error::AppError;
use payload_cache::PayloadCache;
use routes::monitor_routes;

pub struct AppState {
    pub repository: Arc<dyn MonitorRepository>,
    pub executor: CheckExecutor,
    pub payload_cache: PayloadCache,
}

async fn health_check_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_axum_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest("/api/monitors", monitor_routes::create_monitor_router())
        .with_state(app_state)
}
