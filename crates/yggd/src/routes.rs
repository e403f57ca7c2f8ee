//! API routes for yggd.
//!
//! Domain refusals are 200s with `isVerified: false`; transport-level
//! failures map to the HTTP taxonomy (400 missing fields, 408 deadline,
//! 500 internal). An uncaught failure never leaks an answer.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::error;

use ygg_common::api::{
    ComponentHealth, HealthComponents, HealthResponse, StreamEvent, YggdrasilRequest,
    YggdrasilResponse,
};
use ygg_common::trace::ThinkingStep;
use ygg_common::YggError;

use crate::server::AppState;
use crate::watcher::alerts::WatcherStatsSnapshot;

type AppStateArc = Arc<AppState>;

pub fn yggdrasil_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/yggdrasil/query", post(query))
        .route("/yggdrasil/query/thinking", post(query_thinking))
        .route("/yggdrasil/query/stream", post(query_stream))
        .route("/yggdrasil/health", post(health).get(health))
}

fn check_request(request: &YggdrasilRequest) -> Result<(), (StatusCode, String)> {
    if request.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }
    if request.user_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "userId must not be empty".to_string()));
    }
    Ok(())
}

fn map_pipeline_error(e: YggError) -> (StatusCode, String) {
    error!("  Pipeline failure: {}", e);
    match e {
        YggError::DeadlineExceeded(_) => (StatusCode::REQUEST_TIMEOUT, e.to_string()),
        // Never leak content on an internal failure.
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
    }
}

async fn query(
    State(state): State<AppStateArc>,
    Json(request): Json<YggdrasilRequest>,
) -> Result<Json<YggdrasilResponse>, (StatusCode, String)> {
    check_request(&request)?;
    let response = state
        .pipeline
        .process(&request)
        .await
        .map_err(map_pipeline_error)?;
    Ok(Json(response))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingResponse {
    #[serde(flatten)]
    response: YggdrasilResponse,
    thinking: Vec<ThinkingStep>,
}

async fn query_thinking(
    State(state): State<AppStateArc>,
    Json(request): Json<YggdrasilRequest>,
) -> Result<Json<ThinkingResponse>, (StatusCode, String)> {
    check_request(&request)?;
    let (response, thinking) = state
        .pipeline
        .process_with_thinking(&request)
        .await
        .map_err(map_pipeline_error)?;
    Ok(Json(ThinkingResponse { response, thinking }))
}

async fn query_stream(
    State(state): State<AppStateArc>,
    Json(request): Json<YggdrasilRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    check_request(&request)?;
    let rx = Arc::clone(&state.pipeline).process_with_streaming(request);
    let stream = ReceiverStream::new(rx).map(|event: StreamEvent| {
        let name = event.event_name();
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(name).data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthPayload {
    #[serde(flatten)]
    health: HealthResponse,
    uptime_secs: u64,
    watcher: WatcherStatsSnapshot,
    alerts_buffered: usize,
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthPayload> {
    let ledger_ok = state.pipeline.ledger().store().node_count().is_ok();
    let munin = if ledger_ok {
        ComponentHealth::Ok
    } else {
        ComponentHealth::Down
    };

    let adapters = state.pipeline.council().registry().len();
    let thing = match adapters {
        0 => ComponentHealth::Down,
        1 | 2 => ComponentHealth::Degraded,
        _ => ComponentHealth::Ok,
    };

    let hugin = if state.hugin_enabled {
        ComponentHealth::Ok
    } else {
        ComponentHealth::Degraded
    };

    let components = HealthComponents {
        ratatosk: ComponentHealth::Ok,
        mimir: munin,
        volva: munin,
        hugin,
        thing,
        odin: ComponentHealth::Ok,
        munin,
    };

    Json(HealthPayload {
        health: HealthResponse {
            status: components.overall(),
            components,
        },
        uptime_secs: state.start_time.elapsed().as_secs(),
        watcher: state.watcher.stats().snapshot(),
        alerts_buffered: state.watcher.alerts().len(),
    })
}
