//! Admin routes: review, approve and revoke bot registrations.
//!
//! All routes require an admin JWT (see `admin_auth_middleware`).

use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use wrbt_common::{
    error::{WrbtError, WrbtResult},
    ids,
    models::{
        ApproveBotRequest, AuditPage, BotIdentity, BotRequestLogEntry, BotStatus, RevokeBotRequest,
        Tier,
    },
    validation::validate_request,
};

use crate::{audit, middleware::AdminContext, pairing, routes::parse_id, AppState};

/// Recent audit entries shown on the bot detail view.
const DETAIL_RECENT_REQUESTS: u32 = 50;

/// Admin bot routes.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/bots", get(list_bots))
        .route("/admin/bots/{bot_id}", get(get_bot))
        .route("/admin/bots/{bot_id}/approve", post(approve_bot))
        .route("/admin/bots/{bot_id}/revoke", post(revoke_bot))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::admin_auth_middleware,
        ))
}

#[derive(Deserialize)]
struct ListBotsQuery {
    status: Option<String>,
}

#[derive(Serialize)]
struct BotListResponse {
    bots: Vec<BotIdentity>,
    total: usize,
}

async fn list_bots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListBotsQuery>,
) -> WrbtResult<Json<BotListResponse>> {
    let status = query
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<BotStatus>())
        .transpose()
        .map_err(WrbtError::validation)?;

    let bots = state.storage(state.stores.bots.list_bots(status)).await?;
    Ok(Json(BotListResponse { total: bots.len(), bots }))
}

#[derive(Serialize)]
struct BotDetailResponse {
    bot: BotIdentity,
    /// Allowlist entry that approved the bot, when no admin did.
    #[serde(skip_serializing_if = "Option::is_none")]
    approved_via_allowlist: Option<Uuid>,
    recent_requests: Vec<BotRequestLogEntry>,
}

async fn get_bot(
    State(state): State<Arc<AppState>>,
    Path(bot_id): Path<String>,
) -> WrbtResult<Json<BotDetailResponse>> {
    let bot_id = parse_id(&bot_id, "bot")?;
    let bot = state
        .storage(state.stores.bots.get_bot(bot_id))
        .await?
        .ok_or_else(|| WrbtError::not_found("Bot"))?;

    let page = AuditPage { limit: DETAIL_RECENT_REQUESTS, offset: 0 };
    let recent_requests = audit::query(&state, bot_id, page).await?;

    let approved_via_allowlist = bot.approved_by.as_deref().and_then(ids::allowlist_entry_of);

    Ok(Json(BotDetailResponse {
        bot,
        approved_via_allowlist,
        recent_requests,
    }))
}

#[derive(Serialize)]
struct ApproveResponse {
    status: BotStatus,
    bot_id: Uuid,
    /// Plaintext bearer token. Returned exactly once.
    token: String,
    tier: Tier,
    message: &'static str,
}

async fn approve_bot(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    Path(bot_id): Path<String>,
    body: Option<Json<ApproveBotRequest>>,
) -> WrbtResult<Json<ApproveResponse>> {
    let bot_id = parse_id(&bot_id, "bot")?;
    let tier = body.and_then(|Json(b)| b.tier);

    let issued = pairing::approve(state, bot_id, admin.subject, tier).await?;

    Ok(Json(ApproveResponse {
        status: issued.bot.status,
        bot_id: issued.bot.id,
        token: issued.token,
        tier: issued.bot.tier,
        message: "Bot approved. Save this token - it will not be shown again!",
    }))
}

#[derive(Serialize)]
struct RevokeResponse {
    status: BotStatus,
    bot_id: Uuid,
    message: &'static str,
}

async fn revoke_bot(
    State(state): State<Arc<AppState>>,
    admin: AdminContext,
    Path(bot_id): Path<String>,
    body: Option<Json<RevokeBotRequest>>,
) -> WrbtResult<Json<RevokeResponse>> {
    let bot_id = parse_id(&bot_id, "bot")?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    validate_request(&req)?;

    let bot = pairing::revoke(state, bot_id, req.reason, admin.subject).await?;

    Ok(Json(RevokeResponse {
        status: bot.status,
        bot_id: bot.id,
        message: "Bot access revoked",
    }))
}
