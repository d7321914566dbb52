//! Dispatcher API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use queueline_core::{DispatcherStats, DispatcherStatus};

use super::error::{dispatcher_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DispatchersResponse {
    pub enabled: bool,
    pub tick_interval_ms: u64,
    pub dispatchers: Vec<DispatcherStatus>,
}

#[derive(Debug, Serialize)]
pub struct StartedResponse {
    pub queue_id: i64,
    pub replicas: usize,
}

#[derive(Debug, Serialize)]
pub struct StoppedResponse {
    pub queue_id: i64,
    pub stats: DispatcherStats,
}

/// Running dispatchers and their states
pub async fn list_dispatchers(State(state): State<Arc<AppState>>) -> Json<DispatchersResponse> {
    let supervisor = state.supervisor();
    Json(DispatchersResponse {
        enabled: supervisor.config().enabled,
        tick_interval_ms: supervisor.config().tick_interval_ms,
        dispatchers: supervisor.status().await,
    })
}

/// Start dispatching a queue
pub async fn start_dispatcher(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
) -> Result<(StatusCode, Json<StartedResponse>), ApiError> {
    let supervisor = state.supervisor();
    supervisor.start(queue_id).await.map_err(dispatcher_error)?;

    Ok((
        StatusCode::CREATED,
        Json(StartedResponse {
            queue_id,
            replicas: supervisor.config().replicas_per_queue.max(1),
        }),
    ))
}

/// Stop dispatching a queue and report what it did
pub async fn stop_dispatcher(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
) -> Result<Json<StoppedResponse>, ApiError> {
    let stats = state
        .supervisor()
        .stop(queue_id)
        .await
        .map_err(dispatcher_error)?;

    Ok(Json(StoppedResponse { queue_id, stats }))
}
