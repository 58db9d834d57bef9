//! Bot-facing routes: registration, status polling and self-service.
//!
//! `/bots/register` and `/bots/status/{code}` are unauthenticated and rate
//! limited per IP. Everything under `/bots/me` requires a bot bearer token
//! (`Authorization: Bearer wrbt_...`) and is audited by
//! `bot_auth_middleware` in `middleware.rs`.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use wrbt_common::{
    error::{WrbtError, WrbtResult},
    models::{AuditPage, BotIdentity, BotRequestLogEntry, RegisterBotRequest, Tier, UpdateBotProfileRequest},
    validation::validate_request,
};

use crate::{
    audit,
    middleware::AuthenticatedBot,
    pairing::{self, ClientContext, PairingStatus},
    rate_limit::{self, Bucket},
    routes::json_body,
    AppState,
};

/// Bot routes.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let register = Router::new()
        .route("/bots/register", post(register_bot))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), Bucket::Register),
            rate_limit::enforce,
        ));

    let status = Router::new()
        .route("/bots/status/{code}", get(bot_status))
        .route_layer(middleware::from_fn_with_state(
            (state.clone(), Bucket::Status),
            rate_limit::enforce,
        ));

    let me = Router::new()
        .route("/bots/me", get(get_me).patch(update_me))
        .route("/bots/me/requests", get(my_requests))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::bot_auth_middleware,
        ));

    Router::new().merge(register).merge(status).merge(me)
}

// ============================================================================
// Registration
// ============================================================================

#[derive(Serialize)]
struct RegisterResponse {
    pairing_code: String,
    status_url: String,
    expires_at: DateTime<Utc>,
    message: &'static str,
    instructions: [&'static str; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    bot_id: Option<Uuid>,
    /// Only present on the allowlist fast path. Shown once.
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tier: Option<Tier>,
}

async fn register_bot(
    State(state): State<Arc<AppState>>,
    client: ClientContext,
    body: Result<Json<RegisterBotRequest>, JsonRejection>,
) -> WrbtResult<(StatusCode, Json<RegisterResponse>)> {
    let req = json_body(body)?;
    let reg = pairing::register(state, req, client).await?;

    let status_url = format!("/api/v1/bots/status/{}", reg.pairing_code);
    let response = match reg.token {
        Some(token) => RegisterResponse {
            pairing_code: reg.pairing_code,
            status_url,
            expires_at: reg.expires_at,
            message: "Bot pre-approved via allowlist. Save this token securely - it will not be shown again.",
            instructions: [
                "1. Store the token in a secret manager",
                "2. Send it on every request as Authorization: Bearer <token>",
                "3. The status_url will report the bot as approved",
                "4. Ask an administrator to revoke the bot if the token leaks",
            ],
            bot_id: Some(reg.bot.id),
            token: Some(token),
            tier: Some(reg.bot.tier),
        },
        None => RegisterResponse {
            pairing_code: reg.pairing_code,
            status_url,
            expires_at: reg.expires_at,
            message: "Pairing code generated. Poll status_url to check approval.",
            instructions: [
                "1. Share this pairing code with the WRBT administrator",
                "2. Wait for admin approval (poll status_url)",
                "3. The administrator receives your API token on approval and passes it to you",
                "4. Use the token in the Authorization: Bearer <token> header",
            ],
            bot_id: None,
            token: None,
            tier: None,
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

// ============================================================================
// Status
// ============================================================================

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: PairingStatus,
    message: &'static str,
}

async fn bot_status(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> WrbtResult<Json<StatusResponse>> {
    let status = pairing::check_status(&state, &code).await?;
    let message = match &status {
        PairingStatus::Pending { .. } => {
            "Awaiting administrator approval. Poll this endpoint to check status."
        }
        PairingStatus::Approved { .. } => {
            "Bot approved. The token was issued to the approving administrator and cannot be shown again."
        }
        PairingStatus::Revoked { .. } => "Bot registration was revoked by an administrator.",
    };
    Ok(Json(StatusResponse { status, message }))
}

// ============================================================================
// Authenticated self-service
// ============================================================================

async fn load_self(state: &AppState, bot: &AuthenticatedBot) -> WrbtResult<BotIdentity> {
    state
        .storage(state.stores.bots.get_bot(bot.id))
        .await?
        .ok_or_else(|| WrbtError::not_found("Bot"))
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    bot: AuthenticatedBot,
) -> WrbtResult<Json<BotIdentity>> {
    Ok(Json(load_self(&state, &bot).await?))
}

/// Changing the profile is a write, so it needs `WRITE_LIMITED`.
async fn update_me(
    State(state): State<Arc<AppState>>,
    bot: AuthenticatedBot,
    body: Result<Json<UpdateBotProfileRequest>, JsonRejection>,
) -> WrbtResult<Json<BotIdentity>> {
    bot.require_tier(Tier::WriteLimited)?;
    let req = json_body(body)?;
    validate_request(&req)?;

    let updated = state
        .storage(state.stores.bots.update_profile(
            bot.id,
            req.contact_email.as_deref(),
            req.user_agent.as_deref(),
            Utc::now(),
        ))
        .await?
        .ok_or_else(|| WrbtError::not_found("Bot"))?;

    tracing::info!(bot_id = %bot.id, "Bot profile updated");
    Ok(Json(updated))
}

#[derive(Serialize)]
struct RequestsResponse {
    requests: Vec<BotRequestLogEntry>,
    limit: u32,
    offset: u32,
}

async fn my_requests(
    State(state): State<Arc<AppState>>,
    bot: AuthenticatedBot,
    Query(page): Query<AuditPage>,
) -> WrbtResult<Json<RequestsResponse>> {
    let page = page.clamped();
    let requests = audit::query(&state, bot.id, page).await?;
    Ok(Json(RequestsResponse {
        requests,
        limit: page.limit,
        offset: page.offset,
    }))
}
