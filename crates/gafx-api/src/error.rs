//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`EscrowError`] onto HTTP status codes and machine-readable error
//! codes. Returns JSON bodies of the form
//! `{"error": {"code", "message", "details"}}` and never exposes internal
//! or ledger backend details to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use gafx_escrow::{EscrowError, PricingError};

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VERSION_CONFLICT").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for some client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body or query could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller may not perform this operation (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The action is not legal in the order's current state (409).
    #[error("{0}")]
    InvalidStateTransition(String),

    /// Lost an optimistic race; the client should refetch (409).
    #[error("version conflict: expected version {expected}, current is {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// The order's chat is read-only (409).
    #[error("{0}")]
    ChannelClosed(String),

    /// The ledger refused the fund operation (422).
    #[error("ledger rejected the operation: {0}")]
    LedgerRejected(String),

    /// Transient ledger outage; nothing was committed (503). The backend
    /// message is logged but not returned.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::InvalidStateTransition(_) => (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION"),
            Self::VersionConflict { .. } => (StatusCode::CONFLICT, "VERSION_CONFLICT"),
            Self::ChannelClosed(_) => (StatusCode::CONFLICT, "CHANNEL_CLOSED"),
            Self::LedgerRejected(_) => (StatusCode::UNPROCESSABLE_ENTITY, "LEDGER_REJECTED"),
            Self::LedgerUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "LEDGER_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::VersionConflict { expected, actual } => Some(serde_json::json!({
                "expected_version": expected,
                "current_version": actual,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::LedgerUnavailable(_) => {
                "The escrow ledger is temporarily unavailable; retry the request".to_string()
            }
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::LedgerUnavailable(_) => tracing::warn!(error = %self, "ledger unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Convert engine errors to API errors.
impl From<EscrowError> for AppError {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::NotFound { .. } => Self::NotFound(err.to_string()),
            EscrowError::Forbidden { ref reason, .. } => Self::Forbidden(reason.clone()),
            EscrowError::InvalidStateTransition { .. } => {
                Self::InvalidStateTransition(err.to_string())
            }
            EscrowError::VersionConflict {
                expected, actual, ..
            } => Self::VersionConflict { expected, actual },
            EscrowError::LedgerFailure { ref source, .. } => {
                if source.is_retryable() {
                    Self::LedgerUnavailable(err.to_string())
                } else {
                    Self::LedgerRejected(source.to_string())
                }
            }
            EscrowError::ChannelClosed { .. } => Self::ChannelClosed(err.to_string()),
            EscrowError::Validation(msg) => Self::Validation(msg),
            EscrowError::Pricing(e) => e.into(),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        Self::Validation(err.to_string())
    }
}
