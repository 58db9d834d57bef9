//! Admin routes for the platform allowlist.
//!
//! An active entry lets a bot that registers as that platform identity skip
//! manual review and receive the entry's tier.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use wrbt_common::{
    error::{WrbtError, WrbtResult},
    models::{AllowlistEntry, CreateAllowlistRequest, NewAllowlistEntry, RevokeAllowlistRequest},
    ids,
    validation::{validate_platform, validate_request},
};

use crate::{
    middleware::AdminContext,
    routes::{json_body, parse_id},
    AppState,
};

/// Allowlist routes.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/allowlist", get(list_entries).post(create_entry))
        .route("/admin/allowlist/{entry_id}/revoke", post(revoke_entry))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::admin_auth_middleware,
        ))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Serialize)]
struct ListResponse {
    entries: Vec<AllowlistEntry>,
    total: usize,
}

async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> WrbtResult<Json<ListResponse>> {
    let entries = state
        .storage(state.stores.allowlist.list_entries(query.include_inactive, Utc::now()))
        .await?;
    Ok(Json(ListResponse { total: entries.len(), entries }))
}

async fn create_entry(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    body: Result<Json<CreateAllowlistRequest>, JsonRejection>,
) -> WrbtResult<(StatusCode, Json<AllowlistEntry>)> {
    let mut req = json_body(body)?;
    req.platform = req.platform.trim().to_lowercase();
    req.platform_user_id = req.platform_user_id.trim().to_string();
    validate_request(&req)?;
    validate_platform(&req.platform)?;

    let now = Utc::now();
    if req.expires_at.is_some_and(|at| at <= now) {
        return Err(WrbtError::validation("expires_at must be in the future"));
    }

    let new_entry = NewAllowlistEntry {
        id: ids::new_id(),
        platform: req.platform,
        platform_user_id: req.platform_user_id,
        platform_username: req.platform_username,
        tier: req.tier,
        reason: req.reason,
        added_by: admin.subject,
        expires_at: req.expires_at,
        metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
        created_at: now,
    };

    let entry = state
        .storage(state.stores.allowlist.create_entry(new_entry))
        .await?
        .ok_or_else(|| WrbtError::AlreadyExists {
            resource: "Allowlist entry".into(),
        })?;

    tracing::info!(
        entry_id = %entry.id,
        platform = %entry.platform,
        tier = entry.tier.as_str(),
        added_by = %entry.added_by,
        "Allowlist entry created"
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn revoke_entry(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    Path(entry_id): Path<String>,
    body: Option<Json<RevokeAllowlistRequest>>,
) -> WrbtResult<Json<AllowlistEntry>> {
    let entry_id = parse_id(&entry_id, "allowlist entry")?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    validate_request(&req)?;

    let revoked = state
        .storage(state.stores.allowlist.revoke_entry(
            entry_id,
            &admin.subject,
            req.reason.as_deref(),
            Utc::now(),
        ))
        .await?;

    let Some(entry) = revoked else {
        let existing = state
            .storage(state.stores.allowlist.get_entry(entry_id))
            .await?;
        return Err(match existing {
            Some(_) => WrbtError::AlreadyRevoked,
            None => WrbtError::not_found("Allowlist entry"),
        });
    };

    tracing::info!(entry_id = %entry.id, revoked_by = %admin.subject, "Allowlist entry revoked");
    Ok(Json(entry))
}
