//! Storage interfaces.
//!
//! The API layer only talks to these traits. PostgreSQL/Redis implementations
//! live in [`crate::repository`] and [`crate::redis_pool`]; [`crate::memory`]
//! backs single-process ("lite") deployments and tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use wrbt_common::models::{
    AllowlistEntry, ApprovalUpdate, AuditPage, BotIdentity, BotRequestLogEntry, BotStatus,
    NewAllowlistEntry, NewBot, RevocationUpdate,
};

/// The bot registry. Single source of truth for identity status.
#[async_trait]
pub trait BotStore: Send + Sync {
    /// Insert a pending identity. `Ok(None)` means the pairing code is already taken.
    async fn create_bot(&self, bot: NewBot) -> Result<Option<BotIdentity>>;

    async fn get_bot(&self, id: Uuid) -> Result<Option<BotIdentity>>;

    /// Find by active pairing code, or by the code consumed at approval or revocation.
    async fn find_by_pairing_code(&self, code: &str) -> Result<Option<BotIdentity>>;

    async fn find_by_token_lookup(&self, lookup: &str) -> Result<Option<BotIdentity>>;

    /// Newest first, optionally filtered by status.
    async fn list_bots(&self, status: Option<BotStatus>) -> Result<Vec<BotIdentity>>;

    /// Compare-and-set `pending → approved`. `Ok(None)` when the bot is
    /// missing or no longer pending; the caller re-reads to find out which.
    async fn approve_bot(&self, id: Uuid, update: ApprovalUpdate) -> Result<Option<BotIdentity>>;

    /// Compare-and-set `{pending, approved} → revoked`. Clears the token hash
    /// and any active pairing code. `Ok(None)` when missing or already revoked.
    async fn revoke_bot(&self, id: Uuid, update: RevocationUpdate)
        -> Result<Option<BotIdentity>>;

    /// Overwrite descriptive fields (only those given).
    async fn update_profile(
        &self,
        id: Uuid,
        contact_email: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<BotIdentity>>;

    /// Whether the backend is reachable.
    async fn health_check(&self) -> bool;
}

/// Append-only sink for request audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &BotRequestLogEntry) -> Result<()>;

    /// Newest first.
    async fn list_for_bot(&self, bot_id: Uuid, page: AuditPage) -> Result<Vec<BotRequestLogEntry>>;
}

/// Pre-approved platform identities.
#[async_trait]
pub trait AllowlistStore: Send + Sync {
    /// Insert an entry. `Ok(None)` when an active entry already exists for the
    /// same platform identity.
    async fn create_entry(&self, entry: NewAllowlistEntry) -> Result<Option<AllowlistEntry>>;

    async fn get_entry(&self, id: Uuid) -> Result<Option<AllowlistEntry>>;

    async fn find_active(
        &self,
        platform: &str,
        platform_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AllowlistEntry>>;

    /// Newest first.
    async fn list_entries(&self, include_inactive: bool, now: DateTime<Utc>)
        -> Result<Vec<AllowlistEntry>>;

    /// Mark revoked if not already. `Ok(None)` when missing or already revoked.
    async fn revoke_entry(
        &self,
        id: Uuid,
        revoked_by: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<AllowlistEntry>>;
}

/// Result of one fixed-window increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Calls seen in the current window, including this one.
    pub count: u64,
    /// Time until the window resets.
    pub resets_in: Duration,
}

/// Atomic per-key counters for rate limiting.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, opening a new window of length `window` if none is active.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount>;
}
