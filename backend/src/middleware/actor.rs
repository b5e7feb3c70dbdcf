//! Acting-user extraction
//!
//! There is no authentication layer. Callers identify themselves with an
//! `X-User-Id` header whose UUID is written to ledger rows, approvals and
//! payments.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const ACTOR_HEADER: &str = "x-user-id";

/// The user a request acts on behalf of, when the caller named one
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Actor(pub Option<Uuid>);

impl Actor {
    /// The acting user, for operations that must be attributed
    pub fn require(&self) -> AppResult<Uuid> {
        self.0.ok_or_else(|| {
            AppError::BadRequest(format!("The {} header is required for this operation", ACTOR_HEADER))
        })
    }
}

fn parse_actor(value: Option<&str>) -> AppResult<Actor> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(Actor(None)),
        Some(raw) => Uuid::parse_str(raw)
            .map(|id| Actor(Some(id)))
            .map_err(|_| AppError::BadRequest(format!("{} must be a UUID", ACTOR_HEADER))),
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ACTOR_HEADER)
            .map(|h| h.to_str().map_err(|_| AppError::BadRequest(format!("{} must be a UUID", ACTOR_HEADER))))
            .transpose()?;
        parse_actor(header)
    }
}
