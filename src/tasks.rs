//! Component F — Background Tasks.
//!
//! Two cooperative loops sharing one stop signal: periodic refresh
//! (B -> C) and drain-enrich (C -> E -> C). `spec.md` §4.F.

use crate::aggregator::gather_models;
use crate::brain::BrainClient;
use crate::config::Settings;
use crate::docs::{DocCache, MarkdownExtractor};
use crate::enrich::{enrich_batch, EnrichContext};
use crate::stats::StatsCollector;
use crate::store::ModelStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Everything the two loops need to do their work, shared across restarts.
pub struct TaskDeps {
    pub http_client: reqwest::Client,
    pub settings: Settings,
    pub brain: Box<dyn BrainClient>,
    pub extractor: Box<dyn MarkdownExtractor>,
    pub doc_cache: DocCache,
    pub stats: Arc<StatsCollector>,
}

/// Cooperative stop signal: loops check `stopped` at every sleep quantum and
/// also wake immediately via `notify` (`spec.md` §5).
struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            stopped: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Sleep up to `duration`, waking early if stopped.
    async fn interruptible_sleep(&self, duration: Duration) {
        if self.is_stopped() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.notify.notified() => {}
        }
    }
}

pub struct TaskManager {
    store: Arc<ModelStore>,
    deps: Arc<TaskDeps>,
    refresh_handle: Option<JoinHandle<()>>,
    enrich_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<StopSignal>,
}

impl TaskManager {
    pub fn new(store: Arc<ModelStore>, deps: Arc<TaskDeps>) -> Self {
        Self {
            store,
            deps,
            refresh_handle: None,
            enrich_handle: None,
            stop_signal: StopSignal::new(),
        }
    }

    /// Start both loops (idempotent).
    pub fn start(&mut self) {
        if self.refresh_handle.is_some() || self.enrich_handle.is_some() {
            return;
        }

        self.stop_signal = StopSignal::new();

        let refresh_store = self.store.clone();
        let refresh_deps = self.deps.clone();
        let refresh_stop = self.stop_signal.clone();
        self.refresh_handle = Some(tokio::spawn(async move {
            refresh_loop(refresh_store, refresh_deps, refresh_stop).await;
        }));

        let enrich_store = self.store.clone();
        let enrich_deps = self.deps.clone();
        let enrich_stop = self.stop_signal.clone();
        self.enrich_handle = Some(tokio::spawn(async move {
            enrich_loop(enrich_store, enrich_deps, enrich_stop).await;
        }));
    }

    /// Signal both loops to stop and wait for them to exit. Idempotent.
    pub async fn stop(&mut self) {
        if self.refresh_handle.is_none() && self.enrich_handle.is_none() {
            return;
        }

        self.stop_signal.stop();

        if let Some(handle) = self.refresh_handle.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.enrich_handle.take() {
            let _ = handle.await;
        }
    }

    /// Cancel both tasks, clear the store, and start again.
    pub async fn restart(&mut self) {
        self.stop().await;
        self.store.clear();
        self.start();
    }
}

async fn refresh_loop(store: Arc<ModelStore>, deps: Arc<TaskDeps>, stop: Arc<StopSignal>) {
    tracing::info!(interval_secs = deps.settings.time.fetch_models_interval.as_secs(), "refresh loop started");

    // Tiny initial delay so the server accepts connections immediately.
    stop.interruptible_sleep(Duration::from_millis(100)).await;

    while !stop.is_stopped() {
        let started = Instant::now();
        let models = gather_models(&deps.http_client, &deps.settings).await;
        let models_seen = models.len();
        store.update_models(models);
        deps.stats
            .record_refresh(models_seen, store.queue_len(), started.elapsed().as_millis())
            .await;

        // Sleep in small steps so stop() is noticed promptly.
        let mut remaining = deps.settings.time.fetch_models_interval;
        let step = Duration::from_millis(500);
        while remaining > Duration::ZERO && !stop.is_stopped() {
            let this_step = remaining.min(step);
            stop.interruptible_sleep(this_step).await;
            remaining = remaining.saturating_sub(this_step);
        }
    }

    tracing::info!("refresh loop stopped");
}

async fn enrich_loop(store: Arc<ModelStore>, deps: Arc<TaskDeps>, stop: Arc<StopSignal>) {
    tracing::info!("enrichment loop started");

    while !stop.is_stopped() {
        let batch = store.next_batch(deps.settings.brain.max_batch_size);
        if batch.is_empty() {
            stop.interruptible_sleep(deps.settings.time.enrich_idle_sleep).await;
            continue;
        }

        let started = Instant::now();
        let ctx = EnrichContext {
            brain_config: &deps.settings.brain,
            prompts: &deps.settings.brain_prompts,
            sources: &deps.settings.model_info_sources,
            doc_cache: &deps.doc_cache,
            extractor: deps.extractor.as_ref(),
            brain: deps.brain.as_ref(),
        };

        let (enriched, failed) = enrich_batch(batch, &ctx).await;
        let enriched_count = enriched.len();
        let failed_count = failed.len();

        if !enriched.is_empty() {
            store.apply_enrichment(enriched);
        }
        if !failed.is_empty() {
            store.requeue(failed);
        }

        deps.stats
            .record_enrich(enriched_count, failed_count, started.elapsed().as_millis())
            .await;

        if enriched_count == 0 && failed_count > 0 {
            // Entire batch failed outright; brief backoff before retrying.
            stop.interruptible_sleep(deps.settings.time.enrich_idle_sleep).await;
        }
    }

    tracing::info!("enrichment loop stopped");
}
