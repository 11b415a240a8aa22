//! Component A — Provider Fetcher.
//!
//! `fetch(provider)` never throws to its caller: every failure mode
//! (non-2xx, connection failure, malformed JSON, timeout, unexpected shape)
//! degrades to an empty result plus a log line, so one broken provider can
//! never starve the others (`spec.md` §4.A).

use crate::model::{Model, ProviderConfig};
use serde_json::Value;

/// Fetch the current model list from one provider. Suspending I/O; never
/// returns an `Err` — see module docs.
pub async fn fetch(client: &reqwest::Client, provider: &ProviderConfig, timeout: std::time::Duration) -> Vec<Model> {
    let url = format!("{}/models", provider.internal_base_url.trim_end_matches('/'));

    let mut req = client.get(&url).timeout(timeout);
    if let Some(key) = &provider.api_key {
        req = req.bearer_auth(key);
    }

    let response = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(provider = %provider.base_url, url = %url, error = %e, "failed to fetch /models");
            return Vec::new();
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            provider = %provider.base_url,
            url = %url,
            status = %status,
            body = %truncate(&body, 200),
            "provider returned non-2xx for /models"
        );
        return Vec::new();
    }

    let payload: Value = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(provider = %provider.base_url, url = %url, error = %e, "non-JSON /models response");
            return Vec::new();
        }
    };

    let entries = extract_entries(&payload);
    if entries.is_none() {
        tracing::error!(provider = %provider.base_url, url = %url, payload = %truncate(&payload.to_string(), 200), "unexpected /models payload shape");
    }
    let entries = entries.unwrap_or_default();

    let mut models = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Value::Object(obj) = entry {
            if !matches!(obj.get("id"), Some(Value::String(_))) {
                continue;
            }
            if let Some(model) = Model::from_upstream(provider.clone(), obj) {
                models.push(model);
            }
        }
    }

    tracing::info!(provider = %provider.base_url, count = models.len(), "fetched models from provider");
    models
}

/// Accept `{data: [...]}`, `{data: {...}}` (singleton), or a bare list.
/// Anything else returns `None` so the caller can log the mismatch once.
fn extract_entries(payload: &Value) -> Option<Vec<Value>> {
    match payload {
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(arr)) => Some(arr.clone()),
            Some(Value::Object(obj)) => Some(vec![Value::Object(obj.clone())]),
            _ => None,
        },
        Value::Array(arr) => Some(arr.clone()),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}
