//! Core data model: provider identity, the `Model` record and its meta bag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One upstream OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// URL exposed to clients and used as the identity key.
    pub base_url: String,
    /// URL actually dialled; defaults to `base_url`.
    pub internal_base_url: String,
    /// Human-readable label referenced by brain prompt templates.
    pub label: String,
    pub api_key: Option<String>,
    pub files_size_gatherer: Option<FilesSizeGathererConfig>,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let internal_base_url = base_url.clone();
        let label = base_url.clone();
        Self {
            base_url,
            internal_base_url,
            label,
            api_key: None,
            files_size_gatherer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesSizeGathererConfig {
    pub path: String,
    pub base_path: String,
    pub timeout_seconds: u64,
}

/// Equality/hash key for a model: `(provider.base_url, model_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey {
    pub base_url: String,
    pub id: String,
}

impl ModelKey {
    pub fn new(base_url: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            id: id.into(),
        }
    }
}

/// Known enrichment fields plus an open extension bag for forward
/// compatibility with arbitrary provider/brain fields.
///
/// Merge rule ("do not overwrite existing keys") applies uniformly to the
/// known fields and to `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelMeta {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelMeta {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Merge `other` into `self`, only filling slots that are currently
    /// unset. Existing values — including prior enrichment — are preserved.
    pub fn merge_missing(&mut self, other: ModelMeta) {
        if self.size.is_none() {
            self.size = other.size;
        }
        if self.summary.is_none() {
            self.summary = other.summary;
        }
        if self.types.is_none() {
            self.types = other.types;
        }
        if self.recommended_use.is_none() {
            self.recommended_use = other.recommended_use;
        }
        if self.priority.is_none() {
            self.priority = other.priority;
        }
        for (k, v) in other.extra {
            self.extra.entry(k).or_insert(v);
        }
    }
}

/// A single discovered model: the upstream payload verbatim, plus meta.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub key: ModelKey,
    pub provider: ProviderConfig,
    /// The upstream `/models` entry, verbatim, minus `id` and `meta` which
    /// are tracked separately (and re-merged on snapshot).
    pub raw: Map<String, Value>,
    pub meta: ModelMeta,
}

impl Model {
    /// Build a `Model` from one upstream `/models` list entry.
    ///
    /// `entry` must be a JSON object containing a string `id`; callers are
    /// expected to have already checked that (see `fetcher.rs`).
    pub fn from_upstream(provider: ProviderConfig, mut entry: Map<String, Value>) -> Option<Self> {
        let id = entry.get("id")?.as_str()?.to_string();
        entry.remove("id");

        let incoming_meta = entry
            .remove("meta")
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        let mut meta = ModelMeta::new(provider.base_url.clone());
        meta.extra = incoming_meta;

        let key = ModelKey::new(provider.base_url.clone(), id);
        Some(Self {
            key,
            provider,
            raw: entry,
            meta,
        })
    }

    /// Public projection used for snapshots and for the brain prompt's
    /// trailing "here is the model" message. Invariants upheld here:
    /// `meta.base_url == key.provider.base_url`, `meta["id"]` never shadows
    /// `key.id`, `internal_base_url` never appears.
    pub fn to_public_value(&self) -> Value {
        let mut obj = self.raw.clone();
        obj.retain(|k, _| !k.starts_with("internal_"));
        obj.insert("id".to_string(), Value::String(self.key.id.clone()));
        obj.entry("object".to_string())
            .or_insert_with(|| Value::String("model".to_string()));

        let mut meta_value = serde_json::to_value(&self.meta).unwrap_or(Value::Null);
        if let Some(meta_obj) = meta_value.as_object_mut() {
            meta_obj.insert(
                "base_url".to_string(),
                Value::String(self.provider.base_url.clone()),
            );
        }
        obj.insert("meta".to_string(), meta_value);
        Value::Object(obj)
    }

    /// Fields an incoming fetch would set on this model's meta — used by
    /// the store to decide whether provider-sourced data changed.
    pub fn provider_meta_snapshot(&self) -> BTreeMap<String, Value> {
        self.meta
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(url: &str) -> ProviderConfig {
        ProviderConfig::new(url)
    }

    #[test]
    fn from_upstream_sets_meta_base_url() {
        let mut entry = Map::new();
        entry.insert("id".into(), Value::String("gpt-4".into()));
        let model = Model::from_upstream(provider("https://p1"), entry).unwrap();
        assert_eq!(model.meta.base_url, "https://p1");
        assert_eq!(model.key.id, "gpt-4");
    }

    #[test]
    fn from_upstream_requires_string_id() {
        let entry = Map::new();
        assert!(Model::from_upstream(provider("https://p1"), entry).is_none());
    }

    #[test]
    fn public_value_never_leaks_internal_base_url() {
        let mut entry = Map::new();
        entry.insert("id".into(), Value::String("m".into()));
        entry.insert(
            "internal_base_url".into(),
            Value::String("http://10.0.0.1".into()),
        );
        let model = Model::from_upstream(provider("https://p1"), entry).unwrap();
        let val = model.to_public_value();
        assert!(!val.to_string().contains("internal_base_url"));
        assert_eq!(val["meta"]["base_url"], "https://p1");
        assert_eq!(val["id"], "m");
    }

    #[test]
    fn merge_missing_preserves_existing() {
        let mut stored = ModelMeta::new("https://p1");
        stored.size = Some(123);
        let mut incoming = ModelMeta::new("https://p1");
        incoming.size = Some(9);
        incoming.summary = Some("s".into());
        stored.merge_missing(incoming);
        assert_eq!(stored.size, Some(123));
        assert_eq!(stored.summary, Some("s".into()));
    }
}
