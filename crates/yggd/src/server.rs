//! HTTP server for yggd.

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::YggConfig;
use crate::pipeline::Pipeline;
use crate::watcher::Watcher;

/// Application state shared across handlers.
pub struct AppState {
    pub config: YggConfig,
    pub pipeline: Arc<Pipeline>,
    pub watcher: Arc<Watcher>,
    /// Whether an unverified-search provider is wired in (HUGIN branch).
    pub hugin_enabled: bool,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: YggConfig,
        pipeline: Arc<Pipeline>,
        watcher: Arc<Watcher>,
        hugin_enabled: bool,
    ) -> Self {
        Self {
            config,
            pipeline,
            watcher,
            hugin_enabled,
            start_time: Instant::now(),
        }
    }
}

/// Run the HTTP server until shutdown.
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config.bind_addr.clone();
    let state = Arc::new(state);

    let app = Router::new()
        .merge(crate::routes::yggdrasil_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
