//! Optional JSON request bodies
//!
//! Some actions take a body that may be left out entirely. An empty body
//! means "use the defaults"; anything else must be valid JSON for `T`.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};

/// A JSON body that falls back to `T::default()` only when no body was sent
#[derive(Debug, Clone, Default)]
pub struct OptionalJson<T>(pub T);

fn parse_optional_json<T>(body: &[u8]) -> AppResult<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::validation("body", format!("Invalid request body: {}", e)))
}

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        parse_optional_json(&body).map(OptionalJson)
    }
}
