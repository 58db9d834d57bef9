//! Bot request audit log.

use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use wrbt_common::models::{AuditPage, BotRequestLogEntry};

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<BotRequestLogEntry, sqlx::Error> {
    let status_code: i32 = row.try_get("status_code")?;
    let response_time_ms: i64 = row.try_get("response_time_ms")?;
    Ok(BotRequestLogEntry {
        id: row.try_get("id")?,
        bot_id: row.try_get("bot_id")?,
        endpoint: row.try_get("endpoint")?,
        method: row.try_get("method")?,
        status_code: u16::try_from(status_code).unwrap_or_default(),
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        response_time_ms: u64::try_from(response_time_ms).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_request(pool: &PgPool, entry: &BotRequestLogEntry) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO bot_requests
               (id, bot_id, endpoint, method, status_code, ip_address, user_agent,
                response_time_ms, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
    )
    .bind(entry.id)
    .bind(entry.bot_id)
    .bind(&entry.endpoint)
    .bind(&entry.method)
    .bind(i32::from(entry.status_code))
    .bind(&entry.ip_address)
    .bind(&entry.user_agent)
    .bind(i64::try_from(entry.response_time_ms).unwrap_or(i64::MAX))
    .bind(entry.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Newest first.
pub async fn list_for_bot(
    pool: &PgPool,
    bot_id: Uuid,
    page: AuditPage,
) -> Result<Vec<BotRequestLogEntry>> {
    let rows = sqlx::query(
        r#"SELECT * FROM bot_requests
           WHERE bot_id = $1
           ORDER BY created_at DESC, id DESC
           LIMIT $2 OFFSET $3"#,
    )
    .bind(bot_id)
    .bind(i64::from(page.limit))
    .bind(i64::from(page.offset))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_entry).collect::<Result<_, _>>()?)
}
