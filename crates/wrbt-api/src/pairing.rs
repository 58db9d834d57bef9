//! Pairing protocol: registration, status polling, approval and revocation.
//!
//! A bot registers and gets a short pairing code. An admin approves the
//! pending identity, which mints the bearer token and hands it back exactly
//! once. Status polling reports progress but never carries a token.
//!
//! Approve, revoke and register run detached from the calling request so a
//! client hanging up cannot cancel a transition halfway through.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use wrbt_common::crypto;
use wrbt_common::error::{WrbtError, WrbtResult};
use wrbt_common::models::{
    AllowlistEntry, ApprovalUpdate, BotIdentity, BotStatus, NewBot, RegisterBotRequest,
    RevocationUpdate, Tier,
};
use wrbt_common::ids;
use wrbt_common::validation::{validate_platform, validate_request};

use crate::AppState;

/// Unique-collision retries when allocating a pairing code.
const MAX_CODE_ATTEMPTS: usize = 5;

/// Where a registration came from.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub ip: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub bot: BotIdentity,
    pub pairing_code: String,
    pub expires_at: DateTime<Utc>,
    /// Set only when an allowlist entry pre-approved the bot.
    pub token: Option<String>,
}

/// A freshly approved bot and its plaintext token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub bot: BotIdentity,
    pub token: String,
}

/// What a polling bot is told about its registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PairingStatus {
    Pending {
        requested_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    },
    Approved {
        bot_id: Uuid,
        tier: Tier,
        approved_at: Option<DateTime<Utc>>,
        /// Always true; the token went to the approver.
        token_collected: bool,
    },
    Revoked {
        revoked_at: Option<DateTime<Utc>>,
        reason: Option<String>,
    },
}

// ============================================================================
// Helpers
// ============================================================================

/// Run `fut` on its own task and wait for it.
async fn detached<T, F>(fut: F) -> WrbtResult<T>
where
    T: Send + 'static,
    F: Future<Output = WrbtResult<T>> + Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| WrbtError::Internal(anyhow::Error::new(e).context("pairing task failed")))?
}

/// Hash a secret with the configured policy off the async executor.
pub async fn hash_secret(state: &AppState, secret: String) -> WrbtResult<String> {
    let policy = state.hashing.clone();
    tokio::task::spawn_blocking(move || policy.hash_secret(&secret))
        .await
        .map_err(|e| WrbtError::Internal(anyhow::Error::new(e)))?
        .map_err(WrbtError::from)
}

/// Verify a secret with the configured policy off the async executor.
pub async fn verify_secret(state: &AppState, secret: String, stored: String) -> WrbtResult<bool> {
    let policy = state.hashing.clone();
    tokio::task::spawn_blocking(move || policy.verify_secret(&secret, &stored))
        .await
        .map_err(|e| WrbtError::Internal(anyhow::Error::new(e)))
}

/// After a failed compare-and-set, read the record again to name the conflict.
async fn transition_conflict(state: &AppState, bot_id: Uuid) -> WrbtError {
    match state.storage(state.stores.bots.get_bot(bot_id)).await {
        Ok(None) => WrbtError::not_found("Bot"),
        Ok(Some(bot)) => match bot.status {
            BotStatus::Approved => WrbtError::AlreadyApproved,
            BotStatus::Revoked => WrbtError::AlreadyRevoked,
            BotStatus::Pending => {
                WrbtError::Internal(anyhow::anyhow!("bot {bot_id} still pending after failed transition"))
            }
        },
        Err(e) => e,
    }
}

/// Mint a token and move `bot_id` from pending to approved in one write.
///
/// The token only exists in memory until the compare-and-set lands, so no
/// reader ever sees an approved bot without a stored hash.
async fn issue_token(
    state: &AppState,
    bot_id: Uuid,
    tier: Option<Tier>,
    approved_by: String,
) -> WrbtResult<IssuedToken> {
    let token = crypto::generate_api_key();
    let update = ApprovalUpdate {
        tier,
        token_lookup: crypto::token_lookup_key(&token),
        token_hash: hash_secret(state, token.clone()).await?,
        approved_by,
        approved_at: Utc::now(),
    };

    match state.storage(state.stores.bots.approve_bot(bot_id, update)).await? {
        Some(bot) => {
            tracing::info!(
                bot_id = %bot.id,
                approved_by = bot.approved_by.as_deref().unwrap_or_default(),
                tier = bot.tier.as_str(),
                "Bot approved"
            );
            Ok(IssuedToken { bot, token })
        }
        None => Err(transition_conflict(state, bot_id).await),
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Create a pending identity and hand out its pairing code.
pub async fn register(
    state: Arc<AppState>,
    req: RegisterBotRequest,
    client: ClientContext,
) -> WrbtResult<Registration> {
    let req = req.normalized();
    validate_request(&req)?;
    if let Some(platform) = &req.platform {
        validate_platform(platform)?;
    }
    if req.platform.is_some() != req.platform_user_id.is_some() {
        return Err(WrbtError::validation(
            "platform and platform_user_id must be provided together",
        ));
    }

    detached(async move { register_inner(&state, req, client).await }).await
}

async fn register_inner(
    state: &AppState,
    req: RegisterBotRequest,
    client: ClientContext,
) -> WrbtResult<Registration> {
    let now = Utc::now();

    let allowlisted: Option<AllowlistEntry> = match (&req.platform, &req.platform_user_id) {
        (Some(platform), Some(user_id)) => {
            state
                .storage(state.stores.allowlist.find_active(platform, user_id, now))
                .await?
        }
        _ => None,
    };

    let mut metadata = serde_json::json!({ "ip": client.ip });
    if let Some(platform) = &req.platform {
        metadata["platform"] = platform.clone().into();
        metadata["platform_user_id"] = req.platform_user_id.clone().into();
        metadata["platform_username"] = req.platform_username.clone().into();
    }
    if let Some(entry) = &allowlisted {
        metadata["allowlist_entry_id"] = entry.id.to_string().into();
    }

    let expires_at = crypto::compute_expiry(state.settings.pairing_ttl);
    let mut created = None;
    for attempt in 1..=MAX_CODE_ATTEMPTS {
        let code = crypto::generate_pairing_code(state.settings.pairing_code_length)?;
        let new_bot = NewBot {
            id: ids::new_id(),
            name: req.name.clone(),
            contact_email: req.contact_email.clone(),
            user_agent: req.user_agent.clone().or_else(|| client.user_agent.clone()),
            pairing_code: code,
            pairing_expires_at: expires_at,
            metadata: metadata.clone(),
            created_at: now,
        };

        match state.storage(state.stores.bots.create_bot(new_bot)).await? {
            Some(bot) => {
                created = Some(bot);
                break;
            }
            None => tracing::debug!(attempt, "Pairing code collision, retrying"),
        }
    }

    let bot = created.ok_or_else(|| {
        WrbtError::Internal(anyhow::anyhow!(
            "no unique pairing code after {MAX_CODE_ATTEMPTS} attempts"
        ))
    })?;
    let pairing_code = bot.pairing_code.clone().unwrap_or_default();

    tracing::info!(bot_id = %bot.id, name = %bot.name, ip = %client.ip, "Bot registered");

    let Some(entry) = allowlisted else {
        return Ok(Registration { bot, pairing_code, expires_at, token: None });
    };

    let issued = issue_token(state, bot.id, Some(entry.tier), ids::allowlist_approver(entry.id)).await?;
    Ok(Registration {
        bot: issued.bot,
        pairing_code,
        expires_at,
        token: Some(issued.token),
    })
}

/// Report where a registration stands. Never returns a token.
pub async fn check_status(state: &AppState, code: &str) -> WrbtResult<PairingStatus> {
    if !crypto::is_well_formed_pairing_code(code) {
        return Err(WrbtError::not_found("Pairing code"));
    }

    let bot = state
        .storage(state.stores.bots.find_by_pairing_code(code))
        .await?
        .ok_or_else(|| WrbtError::not_found("Pairing code"))?;

    Ok(match bot.status {
        BotStatus::Pending if crypto::is_expired(bot.pairing_expires_at) => {
            return Err(WrbtError::Expired);
        }
        BotStatus::Pending => PairingStatus::Pending {
            requested_at: bot.created_at,
            expires_at: bot.pairing_expires_at,
        },
        BotStatus::Approved => PairingStatus::Approved {
            bot_id: bot.id,
            tier: bot.tier,
            approved_at: bot.approved_at,
            token_collected: true,
        },
        BotStatus::Revoked => PairingStatus::Revoked {
            revoked_at: bot.revoked_at,
            reason: bot.revoked_reason,
        },
    })
}

/// Approve a pending bot and return its token. The token is never stored
/// in plaintext and cannot be fetched again.
pub async fn approve(
    state: Arc<AppState>,
    bot_id: Uuid,
    admin: String,
    tier: Option<Tier>,
) -> WrbtResult<IssuedToken> {
    detached(async move {
        let bot = state
            .storage(state.stores.bots.get_bot(bot_id))
            .await?
            .ok_or_else(|| WrbtError::not_found("Bot"))?;

        match bot.status {
            BotStatus::Approved => return Err(WrbtError::AlreadyApproved),
            BotStatus::Revoked => return Err(WrbtError::AlreadyRevoked),
            BotStatus::Pending => {}
        }

        issue_token(&state, bot_id, tier, admin).await
    })
    .await
}

/// Revoke a pending or approved bot. Its token stops working immediately.
pub async fn revoke(
    state: Arc<AppState>,
    bot_id: Uuid,
    reason: Option<String>,
    admin: String,
) -> WrbtResult<BotIdentity> {
    detached(async move {
        let bot = state
            .storage(state.stores.bots.get_bot(bot_id))
            .await?
            .ok_or_else(|| WrbtError::not_found("Bot"))?;
        if bot.status == BotStatus::Revoked {
            return Err(WrbtError::AlreadyRevoked);
        }

        let update = RevocationUpdate { reason, revoked_at: Utc::now() };
        match state.storage(state.stores.bots.revoke_bot(bot_id, update)).await? {
            Some(bot) => {
                tracing::info!(bot_id = %bot.id, revoked_by = %admin, "Bot revoked");
                Ok(bot)
            }
            None => Err(transition_conflict(&state, bot_id).await),
        }
    })
    .await
}
