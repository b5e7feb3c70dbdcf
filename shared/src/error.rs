//! Domain error model

use thiserror::Error;
use uuid::Uuid;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failures raised by the domain layer.
///
/// Infrastructure concerns (database, configuration) live in the backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A status change outside the lifecycle's declared adjacency.
    #[error("cannot {action} {entity} in status '{from}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: String,
    },

    /// A stock decrement would take a balance below zero.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: Uuid,
        available: i32,
        requested: i32,
    },

    /// A value failed validation.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// An approval was attempted by the same user that created the document.
    #[error("{entity} must be approved by a different user than its creator")]
    SameActor { entity: &'static str },

    /// A ledger post was requested with a zero delta.
    #[error("stock movement quantity cannot be zero")]
    ZeroQuantity,

    /// Quantity arithmetic left the representable range.
    #[error("stock quantity overflow")]
    QuantityOverflow,
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        action: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            action: action.into(),
        }
    }
}
