//! Ticket API handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use queueline_core::{
    ArchiveOutcome, CreateOutcome, NewTicket, StatusUpdate, Ticket, TicketStatus,
};

use super::error::{api_error, bad_request, ticket_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a ticket
#[derive(Debug, Deserialize)]
pub struct CreateTicketBody {
    pub queue_id: i64,
    pub customer_name: String,
    /// Carried but not used for ordering
    pub priority: Option<i32>,
    /// Expected service time in seconds
    pub estimated_time: Option<i64>,
    /// Only `waiting` is accepted
    pub status: Option<TicketStatus>,
}

impl From<CreateTicketBody> for NewTicket {
    fn from(body: CreateTicketBody) -> Self {
        NewTicket {
            queue_id: body.queue_id,
            customer_name: body.customer_name,
            priority: body.priority,
            estimated_time: body.estimated_time.unwrap_or(0),
            status: body.status,
        }
    }
}

/// How the creation event was delivered
#[derive(Debug, Serialize)]
pub struct PublishReport {
    /// Offset in the durable creation log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable_offset: Option<u64>,
    /// Why the durable append is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable_gap: Option<String>,
    pub live_receivers: usize,
}

/// Response for ticket creation
#[derive(Debug, Serialize)]
pub struct CreateTicketResponse {
    pub id: i64,
    pub ticket: Ticket,
    pub published: PublishReport,
}

impl From<CreateOutcome> for CreateTicketResponse {
    fn from(outcome: CreateOutcome) -> Self {
        let (durable_offset, durable_gap) = match outcome.durable {
            Ok(offset) => (Some(offset), None),
            Err(gap) => (None, Some(gap.to_string())),
        };
        Self {
            id: outcome.ticket.id,
            ticket: outcome.ticket,
            published: PublishReport {
                durable_offset,
                durable_gap,
                live_receivers: outcome.broadcast_receivers,
            },
        }
    }
}

/// Query parameters for the waiting list
#[derive(Debug, Deserialize)]
pub struct WaitingParams {
    pub queue_id: Option<i64>,
}

/// Response for the waiting list
#[derive(Debug, Serialize)]
pub struct WaitingResponse {
    pub queue_id: i64,
    pub tickets: Vec<Ticket>,
}

/// Request body for a conditional status change
#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub from: TicketStatus,
    pub to: TicketStatus,
    pub expected_version: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub new_version: i64,
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub id: i64,
    pub outcome: ArchiveOutcome,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new ticket
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateTicketBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateTicketResponse>), ApiError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let outcome = state
        .service()
        .create_ticket(body.into())
        .await
        .map_err(ticket_error)?;

    Ok((StatusCode::CREATED, Json(CreateTicketResponse::from(outcome))))
}

/// List waiting tickets of a queue in dispatch order
pub async fn list_waiting(
    State(state): State<Arc<AppState>>,
    params: Result<Query<WaitingParams>, QueryRejection>,
) -> Result<Json<WaitingResponse>, ApiError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let queue_id = match params.queue_id {
        Some(id) if id > 0 => id,
        Some(id) => return Err(bad_request(format!("invalid queue_id: {}", id))),
        None => return Err(bad_request("queue_id is required")),
    };

    let tickets = state
        .service()
        .list_waiting(queue_id)
        .await
        .map_err(ticket_error)?;

    Ok(Json(WaitingResponse { queue_id, tickets }))
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Ticket>, ApiError> {
    state
        .service()
        .get_ticket(id)
        .await
        .map(Json)
        .map_err(ticket_error)
}

/// Apply a status change if the ticket still matches `from` and
/// `expected_version`
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<UpdateStatusBody>, JsonRejection>,
) -> Result<Json<UpdateStatusResponse>, ApiError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let outcome = state
        .service()
        .update_status(id, body.from, body.to, body.expected_version)
        .await
        .map_err(ticket_error)?;

    match outcome {
        StatusUpdate::Applied { new_version, .. } => Ok(Json(UpdateStatusResponse { new_version })),
        StatusUpdate::Conflict => Err(api_error(
            StatusCode::CONFLICT,
            format!(
                "ticket {} is no longer {} at version {}",
                id, body.from, body.expected_version
            ),
        )),
    }
}

/// Move a done ticket to history
pub async fn archive_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ArchiveResponse>, ApiError> {
    let outcome = state
        .service()
        .archive(id)
        .await
        .map_err(ticket_error)?;

    Ok(Json(ArchiveResponse { id, outcome }))
}
