//! Component L — HTTP Surface.
//!
//! Thin, read-only adapter over the store: no business logic here, just
//! method calls and JSON framing (`spec.md` §1, §6).

pub mod handlers;

use crate::config::UiConfig;
use crate::stats::StatsCollector;
use crate::store::ModelStore;
use crate::tasks::TaskManager;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ModelStore>,
    pub stats: Arc<StatsCollector>,
    pub tasks: Arc<Mutex<TaskManager>>,
}

pub fn build_router(state: AppState, ui: &UiConfig) -> Router {
    let mut router = Router::new()
        .route("/v1/models", get(handlers::list_models))
        .route("/api/stats", get(handlers::stats))
        .route("/api/clear", post(handlers::clear))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if ui.static_enabled {
        let root = ui
            .custom_static_path
            .clone()
            .unwrap_or_else(|| "static".to_string());
        router = router.fallback_service(ServeDir::new(root));
    }

    router
}
