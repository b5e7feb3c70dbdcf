//! Error handling for the Warehouse Management Platform
//!
//! Every failure leaves the API in the same envelope as successful
//! responses, with `success: false`, a machine-readable `code` and an
//! optional offending `field`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => AppError::Validation { field, message },
            DomainError::InsufficientStock { .. } => AppError::InsufficientStock(err.to_string()),
            DomainError::InvalidTransition { .. } | DomainError::SameActor { .. } => {
                AppError::InvalidStateTransition(err.to_string())
            }
            DomainError::ZeroQuantity | DomainError::QuantityOverflow => AppError::validation("quantity", err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let first = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, errs)| {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| format!("{} is invalid", field));
                (field.to_string(), message)
            });
        match first {
            Some((field, message)) => AppError::Validation { field, message },
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub data: Option<()>,
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    fn new(code: &'static str, message: impl Into<String>, field: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
            code,
            field,
        }
    }
}

/// Postgres unique-violation SQLSTATE
const UNIQUE_VIOLATION: &str = "23505";

fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Some(db.constraint().unwrap_or("value").to_string())
        }
        _ => None,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("VALIDATION_ERROR", message.clone(), Some(field.clone())),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("VALIDATION_ERROR", msg.clone(), None),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("BAD_REQUEST", msg.clone(), None),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorResponse::new("CONFLICT", message.clone(), Some(resource.clone())),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("NOT_FOUND", format!("{} not found", resource), None),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("INVALID_STATE_TRANSITION", msg.clone(), None),
            ),
            AppError::InsufficientStock(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("INSUFFICIENT_STOCK", msg.clone(), None),
            ),
            AppError::DatabaseError(err) => match unique_violation(err) {
                Some(constraint) => (
                    StatusCode::CONFLICT,
                    ErrorResponse::new(
                        "DUPLICATE_ENTRY",
                        "A record with the same unique value already exists",
                        Some(constraint),
                    ),
                ),
                None => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("DATABASE_ERROR", "A database error occurred", None),
                ),
            },
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("INTERNAL_ERROR", "An internal server error occurred", None),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::warn!(code = body.code, "{}", self);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_domain_errors_map_to_business_failures() {
        let err: AppError = DomainError::invalid_transition("sale", "cancelled", "complete").into();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));

        let err: AppError = DomainError::InsufficientStock {
            product_id: Uuid::nil(),
            available: 1,
            requested: 2,
        }
        .into();
        assert!(matches!(err, AppError::InsufficientStock(_)));

        let err: AppError = DomainError::validation("amount", "too large").into();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "amount"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("Product".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::conflict("warehouse", "in use").into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(DomainError::ZeroQuantity).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::InternalError(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
