//! model-aggregator — discovers models across OpenAI-compatible providers,
//! enriches them with brain-generated metadata, and serves the merged
//! catalog as `/v1/models`.

mod aggregator;
mod brain;
mod config;
mod docs;
mod enrich;
mod error;
mod fetcher;
mod http;
mod logging;
mod model;
mod stats;
mod store;
mod subprocess;
mod tasks;

use brain::HttpBrainClient;
use clap::Parser;
use config::Settings;
use docs::{DocCache, HttpMarkdownExtractor};
use stats::StatsCollector;
use std::path::PathBuf;
use std::sync::Arc;
use store::ModelStore;
use tasks::{TaskDeps, TaskManager};
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "model-aggregator", about = "Aggregates OpenAI-compatible model catalogs")]
struct Cli {
    /// Override the config path instead of reading LLM_AGGREGATOR_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    std::process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Fatal: invalid configuration: {e}");
            return 1;
        }
    };

    if let Err(e) = logging::init(&settings) {
        eprintln!("Failed to initialize logging: {e}");
        return 1;
    }

    tracing::info!(host = %settings.host, port = settings.port, providers = settings.providers.len(), "starting model-aggregator");

    let http_client = match reqwest::Client::builder().build() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to build HTTP client");
            return 1;
        }
    };

    let brain = HttpBrainClient::new(
        http_client.clone(),
        settings.brain.base_url.clone(),
        settings.brain.api_key.clone(),
        settings.time.enrich_models_timeout,
    );
    let extractor = HttpMarkdownExtractor::new(http_client.clone());
    let doc_cache = DocCache::new(settings.time.website_markdown_cache_ttl);
    let stats = Arc::new(StatsCollector::new());

    let ui_config = settings.ui.clone();
    let host = settings.host.clone();
    let port = settings.port;

    let deps = Arc::new(TaskDeps {
        http_client,
        settings,
        brain: Box::new(brain),
        extractor: Box::new(extractor),
        doc_cache,
        stats: stats.clone(),
    });

    let store = Arc::new(ModelStore::new());
    let mut task_manager = TaskManager::new(store.clone(), deps.clone());
    task_manager.start();
    let task_manager = Arc::new(Mutex::new(task_manager));

    let app_state = http::AppState {
        store,
        stats,
        tasks: task_manager.clone(),
    };
    let router = http::build_router(app_state, &ui_config);

    let addr = format!("{host}:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind HTTP listener");
            task_manager.lock().await.stop().await;
            return 1;
        }
    };

    tracing::info!(addr = %addr, "listening");

    let serve = axum::serve(listener, router);
    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    task_manager.lock().await.stop().await;
    0
}
