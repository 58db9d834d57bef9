//! Platform allowlist repository.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use wrbt_common::models::{AllowlistEntry, NewAllowlistEntry};

use super::parse_column;

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<AllowlistEntry, sqlx::Error> {
    Ok(AllowlistEntry {
        id: row.try_get("id")?,
        platform: row.try_get("platform")?,
        platform_user_id: row.try_get("platform_user_id")?,
        platform_username: row.try_get("platform_username")?,
        tier: parse_column(row, "tier")?,
        reason: row.try_get("reason")?,
        added_by: row.try_get("added_by")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
        revoked_by: row.try_get("revoked_by")?,
        revoked_reason: row.try_get("revoked_reason")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_optional(row: Option<sqlx::postgres::PgRow>) -> Result<Option<AllowlistEntry>> {
    Ok(row.as_ref().map(row_to_entry).transpose()?)
}

/// Insert unless an active entry already covers the same platform identity.
pub async fn create_entry(pool: &PgPool, entry: &NewAllowlistEntry) -> Result<Option<AllowlistEntry>> {
    let row = sqlx::query(
        r#"INSERT INTO bot_allowlist
               (id, platform, platform_user_id, platform_username, tier, reason,
                added_by, expires_at, metadata, created_at, updated_at)
           SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10
           WHERE NOT EXISTS (
               SELECT 1 FROM bot_allowlist
               WHERE platform = $2 AND platform_user_id = $3
                 AND revoked_at IS NULL
                 AND (expires_at IS NULL OR expires_at > $10)
           )
           RETURNING *"#,
    )
    .bind(entry.id)
    .bind(&entry.platform)
    .bind(&entry.platform_user_id)
    .bind(&entry.platform_username)
    .bind(entry.tier.as_str())
    .bind(&entry.reason)
    .bind(&entry.added_by)
    .bind(entry.expires_at)
    .bind(&entry.metadata)
    .bind(entry.created_at)
    .fetch_optional(pool)
    .await?;
    map_optional(row)
}

pub async fn get_entry(pool: &PgPool, id: Uuid) -> Result<Option<AllowlistEntry>> {
    let row = sqlx::query("SELECT * FROM bot_allowlist WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    map_optional(row)
}

pub async fn find_active(
    pool: &PgPool,
    platform: &str,
    platform_user_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AllowlistEntry>> {
    let row = sqlx::query(
        r#"SELECT * FROM bot_allowlist
           WHERE platform = $1 AND platform_user_id = $2
             AND revoked_at IS NULL
             AND (expires_at IS NULL OR expires_at > $3)
           ORDER BY created_at DESC
           LIMIT 1"#,
    )
    .bind(platform)
    .bind(platform_user_id)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    map_optional(row)
}

pub async fn list_entries(
    pool: &PgPool,
    include_inactive: bool,
    now: DateTime<Utc>,
) -> Result<Vec<AllowlistEntry>> {
    let rows = sqlx::query(
        r#"SELECT * FROM bot_allowlist
           WHERE $1 OR (revoked_at IS NULL AND (expires_at IS NULL OR expires_at > $2))
           ORDER BY created_at DESC, id DESC"#,
    )
    .bind(include_inactive)
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_entry).collect::<Result<_, _>>()?)
}

pub async fn revoke_entry(
    pool: &PgPool,
    id: Uuid,
    revoked_by: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<AllowlistEntry>> {
    let row = sqlx::query(
        r#"UPDATE bot_allowlist SET
               revoked_at     = $4,
               revoked_by     = $2,
               revoked_reason = $3,
               updated_at     = $4
           WHERE id = $1 AND revoked_at IS NULL
           RETURNING *"#,
    )
    .bind(id)
    .bind(revoked_by)
    .bind(reason)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    map_optional(row)
}
