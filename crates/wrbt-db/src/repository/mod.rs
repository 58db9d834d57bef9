//! Repository layer: query functions organized by domain.
//!
//! Each module exposes free functions over `&PgPool`; [`PgStore`] wires them
//! into the storage traits.

pub mod allowlist;
pub mod bot_requests;
pub mod bots;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use wrbt_common::models::{
    AllowlistEntry, ApprovalUpdate, AuditPage, BotIdentity, BotRequestLogEntry, BotStatus,
    NewAllowlistEntry, NewBot, RevocationUpdate,
};

use crate::store::{AllowlistStore, AuditStore, BotStore};

/// Parse a TEXT column into a domain enum, surfacing failures as decode errors.
pub(crate) fn parse_column<T>(row: &sqlx::postgres::PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = String>,
{
    use sqlx::Row;
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

/// PostgreSQL-backed registry, audit sink and allowlist.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BotStore for PgStore {
    async fn create_bot(&self, bot: NewBot) -> Result<Option<BotIdentity>> {
        bots::create_bot(&self.pool, &bot).await
    }

    async fn get_bot(&self, id: Uuid) -> Result<Option<BotIdentity>> {
        bots::get_bot(&self.pool, id).await
    }

    async fn find_by_pairing_code(&self, code: &str) -> Result<Option<BotIdentity>> {
        bots::get_bot_by_pairing_code(&self.pool, code).await
    }

    async fn find_by_token_lookup(&self, lookup: &str) -> Result<Option<BotIdentity>> {
        bots::get_bot_by_token_lookup(&self.pool, lookup).await
    }

    async fn list_bots(&self, status: Option<BotStatus>) -> Result<Vec<BotIdentity>> {
        bots::list_bots(&self.pool, status).await
    }

    async fn approve_bot(&self, id: Uuid, update: ApprovalUpdate) -> Result<Option<BotIdentity>> {
        bots::approve_bot(&self.pool, id, &update).await
    }

    async fn revoke_bot(
        &self,
        id: Uuid,
        update: RevocationUpdate,
    ) -> Result<Option<BotIdentity>> {
        bots::revoke_bot(&self.pool, id, &update).await
    }

    async fn update_profile(
        &self,
        id: Uuid,
        contact_email: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<BotIdentity>> {
        bots::update_profile(&self.pool, id, contact_email, user_agent, now).await
    }

    async fn health_check(&self) -> bool {
        crate::postgres::health_check(&self.pool).await
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append(&self, entry: &BotRequestLogEntry) -> Result<()> {
        bot_requests::insert_request(&self.pool, entry).await
    }

    async fn list_for_bot(&self, bot_id: Uuid, page: AuditPage) -> Result<Vec<BotRequestLogEntry>> {
        bot_requests::list_for_bot(&self.pool, bot_id, page).await
    }
}

#[async_trait]
impl AllowlistStore for PgStore {
    async fn create_entry(&self, entry: NewAllowlistEntry) -> Result<Option<AllowlistEntry>> {
        allowlist::create_entry(&self.pool, &entry).await
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<AllowlistEntry>> {
        allowlist::get_entry(&self.pool, id).await
    }

    async fn find_active(
        &self,
        platform: &str,
        platform_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AllowlistEntry>> {
        allowlist::find_active(&self.pool, platform, platform_user_id, now).await
    }

    async fn list_entries(
        &self,
        include_inactive: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<AllowlistEntry>> {
        allowlist::list_entries(&self.pool, include_inactive, now).await
    }

    async fn revoke_entry(
        &self,
        id: Uuid,
        revoked_by: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<AllowlistEntry>> {
        allowlist::revoke_entry(&self.pool, id, revoked_by, reason, now).await
    }
}
