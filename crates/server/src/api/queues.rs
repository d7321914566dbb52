//! Per-queue API handlers: counts, durable log replay, worker updates.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use queueline_core::{LoggedEvent, QueueStats};

use super::error::{api_error, bad_request, ticket_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for event replays
const MAX_LIMIT: usize = 1000;

/// Default limit for event replays
const DEFAULT_LIMIT: usize = 100;

/// Query parameters for replaying a queue's log
#[derive(Debug, Deserialize)]
pub struct ReplayParams {
    /// Return events strictly after this offset
    pub after: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReplayResponse {
    pub key: String,
    pub events: Vec<LoggedEvent>,
    /// Offset to pass as `after` for the next page
    pub next_after: u64,
}

#[derive(Debug, Serialize)]
pub struct WorkerUpdateResponse {
    pub key: String,
    pub offset: u64,
}

/// Ticket counts of one queue
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
) -> Result<Json<QueueStats>, ApiError> {
    state
        .service()
        .queue_stats(queue_id)
        .await
        .map(Json)
        .map_err(ticket_error)
}

/// Replay the durable per-queue log
pub async fn replay_events(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
    Query(params): Query<ReplayParams>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let after = params.after.unwrap_or(0);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let key = state.publisher().keys().queue_log(queue_id);

    let events = state
        .publisher()
        .replay(&key, after, limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to replay {}: {}", key, e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let next_after = events.last().map_or(after, |e| e.offset);
    Ok(Json(ReplayResponse {
        key,
        events,
        next_after,
    }))
}

/// Record a worker update for a queue and relay it to live observers
pub async fn post_worker_update(
    State(state): State<Arc<AppState>>,
    Path(queue_id): Path<i64>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<WorkerUpdateResponse>, ApiError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;
    let Value::Object(payload) = body else {
        return Err(bad_request("worker update must be a JSON object"));
    };
    if queue_id <= 0 {
        return Err(bad_request(format!("invalid queue_id: {}", queue_id)));
    }

    let key = state.publisher().keys().worker_updates(queue_id);
    let offset = state
        .publisher()
        .publish_worker_update(queue_id, payload)
        .await
        .map_err(|gap| api_error(StatusCode::BAD_GATEWAY, gap.to_string()))?;

    Ok(Json(WorkerUpdateResponse { key, offset }))
}
