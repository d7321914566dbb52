//! JSON error bodies shared by the API handlers.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use queueline_core::{DispatcherError, TicketError};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// What a failing handler returns.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

/// Map a store error to its HTTP status.
pub fn ticket_error(e: TicketError) -> ApiError {
    let status = match &e {
        TicketError::NotFound(_) => StatusCode::NOT_FOUND,
        TicketError::InvalidTransition { .. } | TicketError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        TicketError::NotArchivable { .. } => StatusCode::CONFLICT,
        TicketError::Contended(_) => StatusCode::SERVICE_UNAVAILABLE,
        TicketError::Persistence(_) => {
            tracing::error!("Ticket store failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string())
}

pub fn dispatcher_error(e: DispatcherError) -> ApiError {
    let status = match &e {
        DispatcherError::AlreadyRunning(_) => StatusCode::CONFLICT,
        DispatcherError::NotRunning(_) => StatusCode::NOT_FOUND,
        DispatcherError::InvalidQueue(_) => StatusCode::BAD_REQUEST,
        DispatcherError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}
