//! Unified error types for the billing API
//!
//! This module defines error types for each layer:
//! - `DomainError`: Core billing rule violations and persistence failures
//! - `GatewayError`: Payment rail (card/PIX/boleto) client errors
//! - `AppError`: Application layer errors (wraps domain errors for HTTP responses)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Domain layer errors - pure business logic errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Operation not permitted in the entity's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A money invariant would be broken (over-payment, over-refund, negative totals)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Optimistic version check failed; the caller may reload and retry
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Payment gateway client errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gateway rejected the request: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Payment rail unavailable: {0}")]
    Unavailable(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Notification dispatch errors (never surfaced to callers)
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned {0}")]
    Status(u16),
}

/// Application layer errors - used by HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for the most common lookup failure
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        AppError::Domain(DomainError::NotFound(format!("{} {} not found", entity, id)))
    }
}

/// Error response body for JSON responses
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Domain(DomainError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "Not found", Some(msg.clone()))
            }
            AppError::Domain(DomainError::InvalidState(msg)) => {
                (StatusCode::CONFLICT, "Invalid state", Some(msg.clone()))
            }
            AppError::Domain(DomainError::InvariantViolation(msg)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invariant violation",
                Some(msg.clone()),
            ),
            AppError::Domain(DomainError::Validation(msg)) => (
                StatusCode::BAD_REQUEST,
                "Validation error",
                Some(msg.clone()),
            ),
            AppError::Domain(DomainError::Conflict(msg)) => {
                (StatusCode::CONFLICT, "Conflict", Some(msg.clone()))
            }
            AppError::Domain(DomainError::Database(msg)) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
            AppError::Domain(DomainError::Internal(msg)) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
            AppError::Gateway(e) => {
                tracing::error!("Payment gateway error: {}", e);
                match e {
                    GatewayError::Rejected { message, .. } => (
                        StatusCode::BAD_GATEWAY,
                        "Payment gateway error",
                        Some(message.clone()),
                    ),
                    GatewayError::Unavailable(_) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Payment rail unavailable",
                        None,
                    ),
                    _ => (StatusCode::BAD_GATEWAY, "Payment gateway error", None),
                }
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            details,
        });

        (status, body).into_response()
    }
}
