//! Handlers for the three core HTTP endpoints (`spec.md` §6, §4.G).

use super::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

/// `GET /v1/models` — the Snapshot Adapter (component G).
pub async fn list_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    let data = state.store.snapshot();
    Json(json!({ "object": "list", "data": data }))
}

/// `GET /api/stats` — recent refresh/enrich cycle counters.
pub async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let entries = state.stats.snapshot().await;
    Json(json!(entries))
}

/// `POST /api/clear` — triggers `tasks.restart()` (cancel, `store.clear()`,
/// respawn both loops).
pub async fn clear(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.tasks.lock().await.restart().await;
    Json(json!({ "status": "cleared" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::docs::{DocCache, MarkdownExtractor};
    use crate::brain::{BrainClient, BrainRequest};
    use crate::error::BrainError;
    use crate::stats::StatsCollector;
    use crate::store::ModelStore;
    use crate::tasks::{TaskDeps, TaskManager};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct NoopBrain;
    #[async_trait]
    impl BrainClient for NoopBrain {
        async fn complete(&self, _r: BrainRequest) -> Result<Option<String>, BrainError> {
            Ok(None)
        }
    }

    struct NoopExtractor;
    #[async_trait]
    impl MarkdownExtractor for NoopExtractor {
        async fn extract(&self, _url: &str) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    fn test_state() -> AppState {
        let settings = Settings::from_yaml_str(
            r#"
brain:
  base_url: https://brain.example
  id: brain-model
providers:
  - base_url: https://p1.example
brain_prompts:
  system: "x"
  user: "y"
"#,
            "test",
        )
        .unwrap();

        let store = Arc::new(ModelStore::new());
        let stats = Arc::new(StatsCollector::new());
        let deps = Arc::new(TaskDeps {
            http_client: reqwest::Client::new(),
            settings,
            brain: Box::new(NoopBrain),
            extractor: Box::new(NoopExtractor),
            doc_cache: DocCache::new(std::time::Duration::from_secs(60)),
            stats: stats.clone(),
        });

        AppState {
            store: store.clone(),
            stats,
            tasks: Arc::new(Mutex::new(TaskManager::new(store, deps))),
        }
    }

    #[tokio::test]
    async fn list_models_wraps_snapshot_in_envelope() {
        let state = test_state();
        let response = list_models(State(state)).await;
        assert_eq!(response.0["object"], "list");
        assert_eq!(response.0["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn clear_returns_status_cleared() {
        let state = test_state();
        let response = clear(State(state)).await;
        assert_eq!(response.0["status"], "cleared");
    }
}
