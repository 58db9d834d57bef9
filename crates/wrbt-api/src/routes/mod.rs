//! API route modules.

pub mod admin;
pub mod allowlist;
pub mod bots;
pub mod health;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use uuid::Uuid;

use wrbt_common::error::{WrbtError, WrbtResult};

/// Unwrap a JSON body, reporting malformed input as a validation error.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> WrbtResult<T> {
    body.map(|Json(v)| v)
        .map_err(|e| WrbtError::validation(e.body_text()))
}

/// Parse an id path segment.
pub(crate) fn parse_id(raw: &str, resource: &str) -> WrbtResult<Uuid> {
    raw.parse()
        .map_err(|_| WrbtError::validation(format!("Invalid {resource} id")))
}
