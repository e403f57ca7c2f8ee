//! Yggdrasil Daemon (yggd)
//!
//! Validation and memory pipeline over a federation of model endpoints.
//! A query becomes a verified answer with literal citations or an explicit
//! refusal; nothing in between is ever emitted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yggd::config::YggConfig;
use yggd::council::adapters::AdapterRegistry;
use yggd::council::Council;
use yggd::ledger::Ledger;
use yggd::pipeline::Pipeline;
use yggd::search::NoopSearch;
use yggd::server::{self, AppState};
use yggd::watcher::Watcher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "yggd=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("[*]  Yggdrasil Daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("[>]  Verified answers with citations, or explicit refusals");

    let config = YggConfig::from_env();

    let ledger = Arc::new(
        Ledger::open(&config.database_url)
            .with_context(|| format!("opening ledger at {}", config.database_url))?,
    );
    info!("[+]  Ledger open: {} node(s)", ledger.store().node_count().unwrap_or(0));

    let registry = Arc::new(AdapterRegistry::from_config(&config));
    info!(
        "[+]  Council: {} adapter(s) registered ({} provider key(s))",
        registry.len(),
        config.provider_key_count()
    );
    let council = Arc::new(Council::new(Arc::clone(&registry)));

    // The unverified-search provider is a deployment concern; without one
    // the HUGIN branch and the watcher simply find nothing.
    let search = Arc::new(NoopSearch);
    if config.provider_key_count() == 0 {
        warn!("[!]  No provider keys - every council will deadlock, queries will refuse");
    }

    let watcher = Arc::new(Watcher::new(Arc::clone(&ledger), search.clone()));
    let handles = watcher.spawn();
    info!("[+]  Watcher: {} queue loop(s) running", handles.len());

    let pipeline = Arc::new(Pipeline::new(Arc::clone(&ledger), council, search));

    let state = AppState::new(config, pipeline, watcher, false);
    server::run(state).await
}
