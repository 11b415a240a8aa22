//! Component M — Stats Collector.
//!
//! Purely observational ring buffer feeding `/api/stats`; never influences
//! core behavior (`spec.md` §6).

use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;

const CAPACITY: usize = 200;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsEntry {
    Refresh {
        ts: i64,
        models_seen: usize,
        queue_len: usize,
        duration_ms: u128,
    },
    Enrich {
        ts: i64,
        enriched: usize,
        failed: usize,
        duration_ms: u128,
    },
}

pub struct StatsCollector {
    entries: Mutex<VecDeque<StatsEntry>>,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    async fn push(&self, entry: StatsEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn record_refresh(&self, models_seen: usize, queue_len: usize, duration_ms: u128) {
        self.push(StatsEntry::Refresh {
            ts: chrono::Utc::now().timestamp(),
            models_seen,
            queue_len,
            duration_ms,
        })
        .await;
    }

    pub async fn record_enrich(&self, enriched: usize, failed: usize, duration_ms: u128) {
        self.push(StatsEntry::Enrich {
            ts: chrono::Utc::now().timestamp(),
            enriched,
            failed,
            duration_ms,
        })
        .await;
    }

    /// Oldest first.
    pub async fn snapshot(&self) -> Vec<StatsEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }
}
