//! Component D — Documentation Fetcher.
//!
//! For a model id, pull markdown from every configured website source
//! concurrently, through a TTL cache that negative-caches misses too
//! (`spec.md` §4.D).

use crate::config::ModelInfoSource;
use crate::model::Model;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Snippet {
    pub source_label: String,
    pub model_id: String,
    pub markdown: String,
}

/// External markdown-from-URL helper contract (component J). A real
/// deployment would shell out to a readability tool; `HttpMarkdownExtractor`
/// below is a minimal, swappable fallback that satisfies the contract.
#[async_trait]
pub trait MarkdownExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> anyhow::Result<String>;
}

pub struct HttpMarkdownExtractor {
    client: reqwest::Client,
}

impl HttpMarkdownExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarkdownExtractor for HttpMarkdownExtractor {
    async fn extract(&self, url: &str) -> anyhow::Result<String> {
        let body = self.client.get(url).send().await?.text().await?;
        Ok(strip_tags(&body))
    }
}

/// Minimal HTML-to-text fallback: drops tags, collapses whitespace.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone)]
struct CacheEntry {
    value: Option<String>,
    inserted_at: Instant,
}

/// `(source_key, model_id) -> markdown | null`, TTL-expired entries are
/// treated as misses.
pub struct DocCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl DocCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, source_key: &str, model_id: &str) -> Option<Option<String>> {
        let entries = self.entries.lock().await;
        let key = (source_key.to_string(), model_id.to_string());
        entries.get(&key).and_then(|e| {
            if e.inserted_at.elapsed() < self.ttl {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    async fn put(&self, source_key: &str, model_id: &str, value: Option<String>) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            (source_key.to_string(), model_id.to_string()),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }
}

/// Trim anything after the first `:` (`llama3:8b` -> `llama3`).
pub fn normalize_model_id(model_id: &str) -> &str {
    model_id.split(':').next().unwrap_or(model_id)
}

/// Gather markdown snippets for `model` across every configured source,
/// concurrently, preserving source order. Only non-empty snippets are
/// returned (`spec.md` §4.D).
pub async fn fetch_model_markdown(
    model: &Model,
    sources: &[ModelInfoSource],
    cache: &DocCache,
    extractor: &dyn MarkdownExtractor,
) -> Vec<Snippet> {
    let normalized_id = normalize_model_id(&model.key.id).to_string();

    let futures = sources.iter().map(|source| {
        let normalized_id = normalized_id.clone();
        async move {
            let markdown = fetch_one(source, &normalized_id, cache, extractor).await;
            markdown.map(|md| Snippet {
                source_label: source.name.clone(),
                model_id: normalized_id.clone(),
                markdown: md,
            })
        }
    });

    futures::future::join_all(futures)
        .await
        .into_iter()
        .flatten()
        .collect()
}

async fn fetch_one(
    source: &ModelInfoSource,
    normalized_id: &str,
    cache: &DocCache,
    extractor: &dyn MarkdownExtractor,
) -> Option<String> {
    if let Some(cached) = cache.get(&source.key, normalized_id).await {
        return cached.filter(|s| !s.is_empty());
    }

    let url = source.url_template.replace("{model_id}", normalized_id);
    let result = match extractor.extract(&url).await {
        Ok(markdown) => Some(markdown),
        Err(e) => {
            tracing::debug!(source = %source.key, model_id = %normalized_id, error = %e, "website scrape failed");
            None
        }
    };

    cache.put(&source.key, normalized_id, result.clone()).await;
    result.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderConfig;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn model(id: &str) -> Model {
        let mut entry = Map::new();
        entry.insert("id".into(), Value::String(id.into()));
        Model::from_upstream(ProviderConfig::new("https://p1"), entry).unwrap()
    }

    #[test]
    fn normalize_model_id_strips_tag() {
        assert_eq!(normalize_model_id("llama3:8b"), "llama3");
        assert_eq!(normalize_model_id("gpt-4"), "gpt-4");
    }

    struct CountingExtractor {
        calls: Arc<AtomicUsize>,
        response: Option<String>,
    }

    #[async_trait]
    impl MarkdownExtractor for CountingExtractor {
        async fn extract(&self, _url: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Some(s) => Ok(s.clone()),
                None => anyhow::bail!("scrape failed"),
            }
        }
    }

    #[tokio::test]
    async fn caches_hits_and_misses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = CountingExtractor {
            calls: calls.clone(),
            response: Some("# Docs".to_string()),
        };
        let cache = DocCache::new(Duration::from_secs(3600));
        let sources = vec![ModelInfoSource {
            key: "hf".into(),
            name: "HuggingFace".into(),
            url_template: "https://hf.co/{model_id}".into(),
        }];

        let m = model("llama3:8b");
        let snippets = fetch_model_markdown(&m, &sources, &cache, &extractor).await;
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].model_id, "llama3");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second call is a cache hit, no extra network call.
        let _ = fetch_model_markdown(&m, &sources, &cache, &extractor).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_scrape_is_cached_as_negative_and_yields_no_snippet() {
        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = CountingExtractor {
            calls: calls.clone(),
            response: None,
        };
        let cache = DocCache::new(Duration::from_secs(3600));
        let sources = vec![ModelInfoSource {
            key: "hf".into(),
            name: "HuggingFace".into(),
            url_template: "https://hf.co/{model_id}".into(),
        }];

        let m = model("llama3");
        let snippets = fetch_model_markdown(&m, &sources, &cache, &extractor).await;
        assert!(snippets.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = fetch_model_markdown(&m, &sources, &cache, &extractor).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "negative result should be cached");
    }
}
