//! Issue Scout — Binary Entrypoint
//! Boots the Axum HTTP server and the subscription scheduler, wiring the
//! adapter registry, LLM clients, store and notifier together.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use issue_scout::agents::AdapterRegistry;
use issue_scout::api::{create_router, AppState};
use issue_scout::config::ScoutConfig;
use issue_scout::controller::Controller;
use issue_scout::llm::{DisabledLlm, FallbackLlm, LlmClient};
use issue_scout::metrics::Metrics;
use issue_scout::notify::{EmailSender, LogNotifier, Notifier};
use issue_scout::process::ResultProcessor;
use issue_scout::subscribe::{
    JsonFileStore, MemoryStore, Scheduler, SubscriptionStore,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("issue_scout=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in production environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ScoutConfig::load()?;
    let metrics = Metrics::init();

    let registry = Arc::new(AdapterRegistry::with_defaults());
    let controller = Arc::new(Controller::new(registry, cfg.controller_cfg()));

    let llm: Arc<dyn LlmClient> = match FallbackLlm::from_env() {
        Some(mux) => Arc::new(mux),
        None => {
            warn!("no LLM provider configured; results will go unscored");
            Arc::new(DisabledLlm)
        }
    };
    let processor = Arc::new(ResultProcessor::new(llm, cfg.pipeline_cfg()));

    let store: Arc<dyn SubscriptionStore> = if cfg.storage.path.is_empty() {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(JsonFileStore::open(&cfg.storage.path)?)
    };

    let notifier: Arc<dyn Notifier> = match EmailSender::from_env() {
        Ok(sender) => Arc::new(sender),
        Err(e) => {
            warn!(error = %e, "smtp not configured; notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let scheduler = Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&controller),
        Arc::clone(&processor),
        notifier,
        cfg.scheduler_cfg(),
    );
    let _scheduler_handle = scheduler.start();

    let state = AppState {
        controller,
        processor,
        store,
        scheduler,
    };
    let router = create_router(state).merge(metrics.router());

    let addr = std::env::var("SCOUT_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "issue-scout listening");
    axum::serve(listener, router).await?;
    Ok(())
}
