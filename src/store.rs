//! Component C — Model Store, the heart of the system.
//!
//! A mutex-protected `models` map plus a FIFO+dedup-set enrichment queue.
//! Critical sections never `.await` (`spec.md` §5), so a plain
//! `std::sync::Mutex` is correct and cheaper than an async one.

use crate::model::{Model, ModelKey};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

struct Inner {
    models: HashMap<ModelKey, Model>,
    queue: VecDeque<Model>,
    queued_keys: HashSet<ModelKey>,
    last_update_ts: i64,
}

impl Inner {
    fn new() -> Self {
        Self {
            models: HashMap::new(),
            queue: VecDeque::new(),
            queued_keys: HashSet::new(),
            last_update_ts: 0,
        }
    }

    /// Enqueue dedup algorithm (`spec.md` §4.C): no-op if already queued.
    fn enqueue_no_duplicate(&mut self, model: Model) {
        if self.queued_keys.contains(&model.key) {
            return;
        }
        self.queued_keys.insert(model.key.clone());
        self.queue.push_back(model);
    }
}

/// The in-memory authoritative catalog.
pub struct ModelStore {
    inner: Mutex<Inner>,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Atomic replace with set-difference semantics (`spec.md` §4.C).
    pub fn update_models(&self, new_models: Vec<Model>) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let new_by_key: HashMap<ModelKey, Model> =
            new_models.into_iter().map(|m| (m.key.clone(), m)).collect();

        let removed_keys: Vec<ModelKey> = inner
            .models
            .keys()
            .filter(|k| !new_by_key.contains_key(*k))
            .cloned()
            .collect();
        for key in removed_keys {
            inner.models.remove(&key);
            inner.queued_keys.remove(&key);
        }

        for (key, incoming) in new_by_key {
            match inner.models.get(&key) {
                None => {
                    inner.models.insert(key, incoming.clone());
                    inner.enqueue_no_duplicate(incoming);
                }
                Some(existing) => {
                    if provider_meta_changed(existing, &incoming) {
                        inner.models.insert(key.clone(), incoming.clone());
                        // The stale instance may still be sitting in the queue
                        // (refresh can fire before the enrich loop drains it);
                        // drop it from queued_keys so the fresh one enqueues.
                        inner.queued_keys.remove(&key);
                        inner.enqueue_no_duplicate(incoming);
                    }
                    // Otherwise keep the stored model (and its enrichment) as-is.
                }
            }
        }

        inner.last_update_ts = now_unix();
    }

    /// Read-only projection for `/v1/models`. Sorted outside the lock;
    /// returned value is unaffected by later mutations (`spec.md` §4.C, §5).
    pub fn snapshot(&self) -> Vec<Value> {
        let mut entries: Vec<Model> = {
            let inner = self.inner.lock().expect("store mutex poisoned");
            inner.models.values().cloned().collect()
        };
        entries.sort_by(|a, b| {
            (&a.key.base_url, a.key.id.to_lowercase()).cmp(&(&b.key.base_url, b.key.id.to_lowercase()))
        });
        entries.iter().map(Model::to_public_value).collect()
    }

    pub fn last_update_ts(&self) -> i64 {
        self.inner.lock().expect("store mutex poisoned").last_update_ts
    }

    pub fn model_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").models.len()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").queue.len()
    }

    /// Non-blocking pop of up to `max_n` items (`spec.md` §4.C).
    pub fn next_batch(&self, max_n: usize) -> Vec<Model> {
        if max_n == 0 {
            return Vec::new();
        }
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let mut batch = Vec::with_capacity(max_n.min(inner.queue.len()));
        while batch.len() < max_n {
            match inner.queue.pop_front() {
                Some(m) => {
                    inner.queued_keys.remove(&m.key);
                    batch.push(m);
                }
                None => break,
            }
        }
        batch
    }

    /// Merge enrichment results back. Unknown keys (model vanished
    /// mid-flight) are silently ignored (`spec.md` §4.C).
    pub fn apply_enrichment(&self, models: Vec<Model>) {
        if models.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for m in models {
            if inner.models.contains_key(&m.key) {
                inner.models.insert(m.key.clone(), m);
            }
        }
    }

    /// Re-enqueue after a failed enrichment attempt. Unknown keys are
    /// skipped (`spec.md` §4.C).
    pub fn requeue(&self, models: Vec<Model>) {
        if models.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for m in models {
            if inner.models.contains_key(&m.key) {
                inner.enqueue_no_duplicate(m);
            }
        }
    }

    /// Drain everything; reset `last_update_ts` to 0 (`spec.md` §4.C).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.models.clear();
        inner.queued_keys.clear();
        inner.queue.clear();
        inner.last_update_ts = 0;
    }
}

/// True if any provider-sourced meta field differs between `existing` and
/// `incoming`. Compares `incoming`'s extension fields only — those are the
/// ones a provider actually supplies; enrichment-added fields never appear
/// there (`spec.md` §4.C / open question resolved in DESIGN.md).
fn provider_meta_changed(existing: &Model, incoming: &Model) -> bool {
    for (k, v) in &incoming.meta.extra {
        if existing.meta.extra.get(k) != Some(v) {
            return true;
        }
    }
    false
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderConfig;
    use serde_json::{Map, Value};

    fn model(base_url: &str, id: &str) -> Model {
        let mut entry = Map::new();
        entry.insert("id".into(), Value::String(id.into()));
        Model::from_upstream(ProviderConfig::new(base_url), entry).unwrap()
    }

    fn model_with_meta(base_url: &str, id: &str, meta: serde_json::Value) -> Model {
        let mut entry = Map::new();
        entry.insert("id".into(), Value::String(id.into()));
        entry.insert("meta".into(), meta);
        Model::from_upstream(ProviderConfig::new(base_url), entry).unwrap()
    }

    #[test]
    fn idempotent_refresh_enqueues_nothing_second_time() {
        let store = ModelStore::new();
        let m = model("https://p1", "a");
        store.update_models(vec![m.clone()]);
        assert_eq!(store.queue_len(), 1);
        store.next_batch(10); // drain so the second update can't just "see" the same queued item
        store.update_models(vec![m]);
        assert_eq!(store.queue_len(), 0);
        assert_eq!(store.model_count(), 1);
    }

    #[test]
    fn at_most_one_queue_entry_per_key() {
        let store = ModelStore::new();
        let m = model("https://p1", "a");
        store.update_models(vec![m.clone()]);
        store.update_models(vec![m.clone()]);
        store.update_models(vec![m]);
        assert_eq!(store.queue_len(), 1);
        let batch = store.next_batch(10);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn removal_cascade_clears_model_and_queued_key() {
        let store = ModelStore::new();
        let a = model("https://p1", "a");
        let b = model("https://p1", "b");
        store.update_models(vec![a.clone(), b.clone()]);
        assert_eq!(store.model_count(), 2);

        store.update_models(vec![b]);
        assert_eq!(store.model_count(), 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0]["id"], "b");

        // enrichment results arriving later for the vanished key are ignored
        store.apply_enrichment(vec![a]);
        assert_eq!(store.model_count(), 1);
    }

    #[test]
    fn snapshot_never_contains_internal_base_url_and_base_url_matches() {
        let store = ModelStore::new();
        store.update_models(vec![model("https://p1", "a"), model("https://p2", "b")]);
        let snapshot = store.snapshot();
        for entry in &snapshot {
            assert!(!entry.to_string().contains("internal_base_url"));
        }
        assert_eq!(snapshot[0]["meta"]["base_url"], "https://p1");
        assert_eq!(snapshot[1]["meta"]["base_url"], "https://p2");
    }

    #[test]
    fn snapshot_sort_stability() {
        let store = ModelStore::new();
        store.update_models(vec![
            model("https://p1", "Zebra"),
            model("https://p1", "alpha"),
        ]);
        let first = store.snapshot();
        let second = store.snapshot();
        assert_eq!(first, second);
        assert_eq!(first[0]["id"], "alpha");
        assert_eq!(first[1]["id"], "Zebra");
    }

    #[test]
    fn provider_meta_change_triggers_replace_and_reenqueue() {
        let store = ModelStore::new();
        let original = model_with_meta("https://p1", "m", serde_json::json!({"name": "old"}));
        store.update_models(vec![original]);
        store.next_batch(10); // drain initial enqueue

        // Enrich it first so we can assert enrichment is discarded below.
        let mut enriched = model_with_meta("https://p1", "m", serde_json::json!({"name": "old"}));
        enriched.meta.summary = Some("old summary".into());
        store.apply_enrichment(vec![enriched]);

        let changed = model_with_meta("https://p1", "m", serde_json::json!({"name": "new"}));
        store.update_models(vec![changed]);

        assert_eq!(store.queue_len(), 1, "provider meta change must re-enqueue");
        let batch = store.next_batch(10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].meta.summary, None, "stale enrichment must be discarded on replace");
    }

    #[test]
    fn provider_meta_change_while_still_queued_enqueues_fresh_instance() {
        let store = ModelStore::new();
        let original = model_with_meta("https://p1", "m", serde_json::json!({"name": "old"}));
        store.update_models(vec![original]);
        // Do NOT drain: the initial enqueue from `update_models` is still
        // sitting in the queue when the provider-meta change arrives, as can
        // happen when refresh outpaces the enrich loop.
        assert_eq!(store.queue_len(), 1);

        let changed = model_with_meta("https://p1", "m", serde_json::json!({"name": "new"}));
        store.update_models(vec![changed]);

        assert_eq!(
            store.queue_len(),
            1,
            "still exactly one queued entry, not silently dropped"
        );
        let batch = store.next_batch(10);
        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch[0].provider_meta_snapshot().get("name").unwrap(),
            "new",
            "the queued instance must be the fresh one, not the stale pre-change copy"
        );
    }

    #[test]
    fn next_batch_boundaries() {
        let store = ModelStore::new();
        assert_eq!(store.next_batch(0).len(), 0);
        assert_eq!(store.next_batch(10).len(), 0);
    }

    #[test]
    fn apply_enrichment_and_requeue_are_noops_on_empty() {
        let store = ModelStore::new();
        store.apply_enrichment(vec![]);
        store.requeue(vec![]);
        assert_eq!(store.model_count(), 0);
    }

    #[test]
    fn enrichment_merge_preserves_existing_meta() {
        let store = ModelStore::new();
        let mut original = model("https://p1", "m");
        original.meta.size = Some(123);
        store.update_models(vec![original]);
        store.next_batch(10);

        let mut brain_result = model("https://p1", "m");
        brain_result.meta.summary = Some("s".into());
        brain_result.meta.size = Some(9); // should not overwrite the stored 123
        store.apply_enrichment(vec![brain_result]);

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0]["meta"]["size"], 123);
    }

    #[test]
    fn clear_during_enrichment_makes_apply_a_noop() {
        let store = ModelStore::new();
        store.update_models(vec![model("https://p1", "m")]);
        let batch = store.next_batch(10);
        assert_eq!(batch.len(), 1);

        store.clear();
        store.apply_enrichment(batch);

        assert_eq!(store.snapshot().len(), 0);
        assert_eq!(store.last_update_ts(), 0);
    }

    #[test]
    fn requeue_after_failure_returns_to_queue() {
        let store = ModelStore::new();
        store.update_models(vec![model("https://p1", "a"), model("https://p1", "b")]);
        let batch = store.next_batch(10);
        assert_eq!(batch.len(), 2);
        assert_eq!(store.queue_len(), 0);

        store.requeue(batch.clone());
        assert_eq!(store.queue_len(), 2);

        let requeued = store.next_batch(10);
        let ids: Vec<_> = requeued.iter().map(|m| m.key.id.clone()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn provider_unavailable_leaves_other_providers_models_intact() {
        let store = ModelStore::new();
        store.update_models(vec![model("https://p1", "a")]);
        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.queue_len(), 1);
    }
}
