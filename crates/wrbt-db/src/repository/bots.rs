//! Bot identity repository: registration, lookup and lifecycle transitions.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use wrbt_common::models::{ApprovalUpdate, BotIdentity, BotStatus, NewBot, RevocationUpdate};

use super::parse_column;

fn row_to_bot(row: &sqlx::postgres::PgRow) -> Result<BotIdentity, sqlx::Error> {
    Ok(BotIdentity {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        contact_email: row.try_get("contact_email")?,
        user_agent: row.try_get("user_agent")?,
        tier: parse_column(row, "tier")?,
        status: parse_column(row, "status")?,
        pairing_code: row.try_get("pairing_code")?,
        pairing_expires_at: row.try_get("pairing_expires_at")?,
        consumed_pairing_code: row.try_get("consumed_pairing_code")?,
        token_lookup: row.try_get("token_lookup")?,
        token_hash: row.try_get("token_hash")?,
        approved_at: row.try_get("approved_at")?,
        approved_by: row.try_get("approved_by")?,
        revoked_at: row.try_get("revoked_at")?,
        revoked_reason: row.try_get("revoked_reason")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_optional(row: Option<sqlx::postgres::PgRow>) -> Result<Option<BotIdentity>> {
    Ok(row.as_ref().map(row_to_bot).transpose()?)
}

pub async fn get_bot(pool: &PgPool, bot_id: Uuid) -> Result<Option<BotIdentity>> {
    let row = sqlx::query("SELECT * FROM bots WHERE id = $1")
        .bind(bot_id)
        .fetch_optional(pool)
        .await?;
    map_optional(row)
}

/// Matches the active code or the one consumed by approval/revocation.
pub async fn get_bot_by_pairing_code(pool: &PgPool, code: &str) -> Result<Option<BotIdentity>> {
    let row = sqlx::query(
        "SELECT * FROM bots WHERE pairing_code = $1 OR consumed_pairing_code = $1 LIMIT 1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;
    map_optional(row)
}

pub async fn get_bot_by_token_lookup(
    pool: &PgPool,
    token_lookup: &str,
) -> Result<Option<BotIdentity>> {
    let row = sqlx::query("SELECT * FROM bots WHERE token_lookup = $1")
        .bind(token_lookup)
        .fetch_optional(pool)
        .await?;
    map_optional(row)
}

pub async fn list_bots(pool: &PgPool, status: Option<BotStatus>) -> Result<Vec<BotIdentity>> {
    let rows = sqlx::query(
        r#"SELECT * FROM bots
           WHERE ($1::TEXT IS NULL OR status = $1)
           ORDER BY created_at DESC, id DESC"#,
    )
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_bot).collect::<Result<_, _>>()?)
}

/// Insert a pending identity. Returns `None` when the code is already in use,
/// either actively or as a consumed code.
pub async fn create_bot(pool: &PgPool, bot: &NewBot) -> Result<Option<BotIdentity>> {
    let row = sqlx::query(
        r#"INSERT INTO bots
               (id, name, contact_email, user_agent, pairing_code, pairing_expires_at,
                metadata, created_at, updated_at)
           SELECT $1, $2, $3, $4, $5, $6, $7, $8, $8
           WHERE NOT EXISTS (SELECT 1 FROM bots WHERE consumed_pairing_code = $5)
           ON CONFLICT DO NOTHING
           RETURNING *"#,
    )
    .bind(bot.id)
    .bind(&bot.name)
    .bind(&bot.contact_email)
    .bind(&bot.user_agent)
    .bind(&bot.pairing_code)
    .bind(bot.pairing_expires_at)
    .bind(&bot.metadata)
    .bind(bot.created_at)
    .fetch_optional(pool)
    .await?;
    map_optional(row)
}

/// `pending → approved` in one statement. Writes the token material, consumes
/// the pairing code and stamps the approval. `None` if the row was not pending.
pub async fn approve_bot(
    pool: &PgPool,
    bot_id: Uuid,
    update: &ApprovalUpdate,
) -> Result<Option<BotIdentity>> {
    let row = sqlx::query(
        r#"UPDATE bots SET
               status                = 'approved',
               tier                  = COALESCE($2, tier),
               token_lookup          = $3,
               token_hash            = $4,
               consumed_pairing_code = pairing_code,
               pairing_code          = NULL,
               pairing_expires_at    = NULL,
               approved_by           = $5,
               approved_at           = $6,
               updated_at            = $6
           WHERE id = $1 AND status = 'pending'
           RETURNING *"#,
    )
    .bind(bot_id)
    .bind(update.tier.map(|t| t.as_str()))
    .bind(&update.token_lookup)
    .bind(&update.token_hash)
    .bind(&update.approved_by)
    .bind(update.approved_at)
    .fetch_optional(pool)
    .await?;
    map_optional(row)
}

/// `{pending, approved} → revoked`. The token hash goes, the lookup key stays.
pub async fn revoke_bot(
    pool: &PgPool,
    bot_id: Uuid,
    update: &RevocationUpdate,
) -> Result<Option<BotIdentity>> {
    let row = sqlx::query(
        r#"UPDATE bots SET
               status                = 'revoked',
               token_hash            = NULL,
               consumed_pairing_code = COALESCE(pairing_code, consumed_pairing_code),
               pairing_code          = NULL,
               pairing_expires_at    = NULL,
               revoked_reason        = $2,
               revoked_at            = $3,
               updated_at            = $3
           WHERE id = $1 AND status <> 'revoked'
           RETURNING *"#,
    )
    .bind(bot_id)
    .bind(&update.reason)
    .bind(update.revoked_at)
    .fetch_optional(pool)
    .await?;
    map_optional(row)
}

pub async fn update_profile(
    pool: &PgPool,
    bot_id: Uuid,
    contact_email: Option<&str>,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<BotIdentity>> {
    let row = sqlx::query(
        r#"UPDATE bots SET
               contact_email = COALESCE($2, contact_email),
               user_agent    = COALESCE($3, user_agent),
               updated_at    = $4
           WHERE id = $1
           RETURNING *"#,
    )
    .bind(bot_id)
    .bind(contact_email)
    .bind(user_agent)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    map_optional(row)
}
