//! In-process backends for lite mode and tests.
//!
//! Every mutation happens under the collection's write lock, which gives the
//! same compare-and-set guarantees as the conditional `UPDATE`s in PostgreSQL.
//! State is lost on restart.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use wrbt_common::models::{
    AllowlistEntry, ApprovalUpdate, AuditPage, BotIdentity, BotRequestLogEntry, BotStatus,
    NewAllowlistEntry, NewBot, RevocationUpdate,
};

use crate::store::{AllowlistStore, AuditStore, BotStore, CounterStore, WindowCount};

// ============================================================================
// Bot registry
// ============================================================================

/// Bots plus the secondary indexes the authenticator and status polling hit.
/// A pairing code stays mapped to its bot for life, whether it is still
/// active or was consumed by approval or revocation.
#[derive(Default)]
struct Registry {
    bots: HashMap<Uuid, BotIdentity>,
    by_code: HashMap<String, Uuid>,
    by_token_lookup: HashMap<String, Uuid>,
}

impl Registry {
    fn by_index(&self, index: &HashMap<String, Uuid>, key: &str) -> Option<BotIdentity> {
        index.get(key).and_then(|id| self.bots.get(id)).cloned()
    }
}

#[derive(Default)]
pub struct MemoryBotStore {
    registry: RwLock<Registry>,
}

impl MemoryBotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BotStore for MemoryBotStore {
    async fn create_bot(&self, new: NewBot) -> Result<Option<BotIdentity>> {
        let mut registry = self.registry.write().await;
        if registry.by_code.contains_key(&new.pairing_code) || registry.bots.contains_key(&new.id) {
            return Ok(None);
        }

        let bot = BotIdentity {
            id: new.id,
            name: new.name,
            contact_email: new.contact_email,
            user_agent: new.user_agent,
            tier: Default::default(),
            status: BotStatus::Pending,
            pairing_code: Some(new.pairing_code),
            pairing_expires_at: Some(new.pairing_expires_at),
            consumed_pairing_code: None,
            token_lookup: None,
            token_hash: None,
            approved_at: None,
            approved_by: None,
            revoked_at: None,
            revoked_reason: None,
            metadata: new.metadata,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        if let Some(code) = &bot.pairing_code {
            registry.by_code.insert(code.clone(), bot.id);
        }
        registry.bots.insert(bot.id, bot.clone());
        Ok(Some(bot))
    }

    async fn get_bot(&self, id: Uuid) -> Result<Option<BotIdentity>> {
        Ok(self.registry.read().await.bots.get(&id).cloned())
    }

    async fn find_by_pairing_code(&self, code: &str) -> Result<Option<BotIdentity>> {
        let registry = self.registry.read().await;
        Ok(registry.by_index(&registry.by_code, code))
    }

    async fn find_by_token_lookup(&self, lookup: &str) -> Result<Option<BotIdentity>> {
        let registry = self.registry.read().await;
        Ok(registry.by_index(&registry.by_token_lookup, lookup))
    }

    async fn list_bots(&self, status: Option<BotStatus>) -> Result<Vec<BotIdentity>> {
        let mut bots: Vec<BotIdentity> = self
            .registry
            .read()
            .await
            .bots
            .values()
            .filter(|b| status.is_none_or(|s| b.status == s))
            .cloned()
            .collect();
        bots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bots)
    }

    async fn approve_bot(&self, id: Uuid, update: ApprovalUpdate) -> Result<Option<BotIdentity>> {
        let mut guard = self.registry.write().await;
        let registry = &mut *guard;
        let Some(bot) = registry.bots.get_mut(&id) else {
            return Ok(None);
        };
        if bot.status != BotStatus::Pending {
            return Ok(None);
        }
        if registry.by_token_lookup.contains_key(&update.token_lookup) {
            anyhow::bail!("token lookup key already assigned to another bot");
        }
        registry.by_token_lookup.insert(update.token_lookup.clone(), id);

        bot.status = BotStatus::Approved;
        if let Some(tier) = update.tier {
            bot.tier = tier;
        }
        bot.token_lookup = Some(update.token_lookup);
        bot.token_hash = Some(update.token_hash);
        bot.consumed_pairing_code = bot.pairing_code.take();
        bot.pairing_expires_at = None;
        bot.approved_at = Some(update.approved_at);
        bot.approved_by = Some(update.approved_by);
        bot.updated_at = update.approved_at;
        Ok(Some(bot.clone()))
    }

    async fn revoke_bot(
        &self,
        id: Uuid,
        update: RevocationUpdate,
    ) -> Result<Option<BotIdentity>> {
        let mut registry = self.registry.write().await;
        let Some(bot) = registry.bots.get_mut(&id) else {
            return Ok(None);
        };
        if bot.status == BotStatus::Revoked {
            return Ok(None);
        }

        bot.status = BotStatus::Revoked;
        bot.token_hash = None;
        if let Some(code) = bot.pairing_code.take() {
            bot.consumed_pairing_code = Some(code);
        }
        bot.pairing_expires_at = None;
        bot.revoked_at = Some(update.revoked_at);
        bot.revoked_reason = update.reason;
        bot.updated_at = update.revoked_at;
        Ok(Some(bot.clone()))
    }

    async fn update_profile(
        &self,
        id: Uuid,
        contact_email: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<BotIdentity>> {
        let mut registry = self.registry.write().await;
        let Some(bot) = registry.bots.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = contact_email {
            bot.contact_email = Some(email.to_string());
        }
        if let Some(ua) = user_agent {
            bot.user_agent = Some(ua.to_string());
        }
        bot.updated_at = now;
        Ok(Some(bot.clone()))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

// ============================================================================
// Audit log
// ============================================================================

#[derive(Default)]
pub struct MemoryAuditStore {
    entries: RwLock<Vec<BotRequestLogEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, oldest first, including those with no bot attached.
    pub async fn all(&self) -> Vec<BotRequestLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &BotRequestLogEntry) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_for_bot(&self, bot_id: Uuid, page: AuditPage) -> Result<Vec<BotRequestLogEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.bot_id == Some(bot_id))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Allowlist
// ============================================================================

#[derive(Default)]
pub struct MemoryAllowlistStore {
    entries: RwLock<HashMap<Uuid, AllowlistEntry>>,
}

impl MemoryAllowlistStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AllowlistStore for MemoryAllowlistStore {
    async fn create_entry(&self, new: NewAllowlistEntry) -> Result<Option<AllowlistEntry>> {
        let mut entries = self.entries.write().await;
        let duplicate = entries.values().any(|e| {
            e.platform == new.platform
                && e.platform_user_id == new.platform_user_id
                && e.is_active_at(new.created_at)
        });
        if duplicate {
            return Ok(None);
        }

        let entry = AllowlistEntry {
            id: new.id,
            platform: new.platform,
            platform_user_id: new.platform_user_id,
            platform_username: new.platform_username,
            tier: new.tier,
            reason: new.reason,
            added_by: new.added_by,
            expires_at: new.expires_at,
            revoked_at: None,
            revoked_by: None,
            revoked_reason: None,
            metadata: new.metadata,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        entries.insert(entry.id, entry.clone());
        Ok(Some(entry))
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<AllowlistEntry>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn find_active(
        &self,
        platform: &str,
        platform_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AllowlistEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| {
                e.platform == platform
                    && e.platform_user_id == platform_user_id
                    && e.is_active_at(now)
            })
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn list_entries(
        &self,
        include_inactive: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<AllowlistEntry>> {
        let mut entries: Vec<AllowlistEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| include_inactive || e.is_active_at(now))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    async fn revoke_entry(
        &self,
        id: Uuid,
        revoked_by: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<AllowlistEntry>> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return Ok(None);
        };
        if entry.revoked_at.is_some() {
            return Ok(None);
        }
        entry.revoked_at = Some(now);
        entry.revoked_by = Some(revoked_by.to_string());
        entry.revoked_reason = reason.map(str::to_string);
        entry.updated_at = now;
        Ok(Some(entry.clone()))
    }
}

// ============================================================================
// Rate-limit counters
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    resets_at: Instant,
}

/// Fixed-window counters keyed by string. Increments for one key are
/// serialized by the DashMap shard lock; unrelated keys never contend.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, Window>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop windows that have already reset. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| w.resets_at > now);
        before - self.windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { count: 0, resets_at: now + window });

        if now >= entry.resets_at {
            *entry = Window { count: 0, resets_at: now + window };
        }
        entry.count += 1;

        Ok(WindowCount {
            count: entry.count,
            resets_in: entry.resets_at.saturating_duration_since(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wrbt_common::models::Tier;

    fn new_bot(code: &str) -> NewBot {
        let now = Utc::now();
        NewBot {
            id: Uuid::now_v7(),
            name: "TestBot".into(),
            contact_email: None,
            user_agent: None,
            pairing_code: code.into(),
            pairing_expires_at: now + chrono::Duration::hours(1),
            metadata: serde_json::json!({}),
            created_at: now,
        }
    }

    fn approval(lookup: &str) -> ApprovalUpdate {
        ApprovalUpdate {
            tier: None,
            token_lookup: lookup.into(),
            token_hash: format!("plain${lookup}"),
            approved_by: "admin".into(),
            approved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_pairing_codes_are_refused() {
        let store = MemoryBotStore::new();
        assert!(store.create_bot(new_bot("ABCDEFGH")).await.unwrap().is_some());
        assert!(store.create_bot(new_bot("ABCDEFGH")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn approval_consumes_code_and_is_single_shot() {
        let store = MemoryBotStore::new();
        let bot = store.create_bot(new_bot("QWERTYUI")).await.unwrap().unwrap();

        let approved = store.approve_bot(bot.id, approval("k1")).await.unwrap().unwrap();
        assert_eq!(approved.status, BotStatus::Approved);
        assert_eq!(approved.pairing_code, None);
        assert_eq!(approved.pairing_expires_at, None);
        assert_eq!(approved.consumed_pairing_code.as_deref(), Some("QWERTYUI"));
        assert_eq!(approved.tier, Tier::ReadOnly);

        assert!(store.approve_bot(bot.id, approval("k2")).await.unwrap().is_none());
        let found = store.find_by_token_lookup("k1").await.unwrap().unwrap();
        assert_eq!(found.id, bot.id);
        assert!(store.find_by_token_lookup("k2").await.unwrap().is_none());
        assert!(store.find_by_pairing_code("QWERTYUI").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn revocation_clears_hash_but_keeps_lookup() {
        let store = MemoryBotStore::new();
        let bot = store.create_bot(new_bot("ZXCVBNMA")).await.unwrap().unwrap();
        store.approve_bot(bot.id, approval("k1")).await.unwrap();

        let update = RevocationUpdate { reason: Some("abuse".into()), revoked_at: Utc::now() };
        let revoked = store.revoke_bot(bot.id, update.clone()).await.unwrap().unwrap();
        assert_eq!(revoked.status, BotStatus::Revoked);
        assert_eq!(revoked.token_hash, None);
        assert_eq!(revoked.token_lookup.as_deref(), Some("k1"));

        assert!(store.revoke_bot(bot.id, update.clone()).await.unwrap().is_none());
        assert!(store.approve_bot(bot.id, approval("k3")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_pending_bot_is_still_found_by_code() {
        let store = MemoryBotStore::new();
        let bot = store.create_bot(new_bot("MNBVCXZL")).await.unwrap().unwrap();
        let update = RevocationUpdate { reason: None, revoked_at: Utc::now() };
        let revoked = store.revoke_bot(bot.id, update).await.unwrap().unwrap();

        assert_eq!(revoked.pairing_code, None);
        let found = store.find_by_pairing_code("MNBVCXZL").await.unwrap().unwrap();
        assert_eq!(found.status, BotStatus::Revoked);
    }

    #[tokio::test]
    async fn indexes_follow_lifecycle_transitions() {
        let store = MemoryBotStore::new();
        let approved = store.create_bot(new_bot("AAAABBBB")).await.unwrap().unwrap();
        let pending = store.create_bot(new_bot("CCCCDDDD")).await.unwrap().unwrap();

        {
            let registry = store.registry.read().await;
            assert_eq!(registry.by_code.len(), 2);
            assert!(registry.by_token_lookup.is_empty());
        }

        store.approve_bot(approved.id, approval("k1")).await.unwrap().unwrap();
        let update = RevocationUpdate { reason: None, revoked_at: Utc::now() };
        store.revoke_bot(pending.id, update.clone()).await.unwrap().unwrap();

        {
            let registry = store.registry.read().await;
            assert_eq!(registry.by_code.get("AAAABBBB"), Some(&approved.id));
            assert_eq!(registry.by_code.get("CCCCDDDD"), Some(&pending.id));
            assert_eq!(registry.by_token_lookup.get("k1"), Some(&approved.id));
        }

        let by_code = store.find_by_pairing_code("AAAABBBB").await.unwrap().unwrap();
        assert_eq!(by_code.status, BotStatus::Approved);
        let by_code = store.find_by_pairing_code("CCCCDDDD").await.unwrap().unwrap();
        assert_eq!(by_code.status, BotStatus::Revoked);

        store.revoke_bot(approved.id, update).await.unwrap().unwrap();
        let by_token = store.find_by_token_lookup("k1").await.unwrap().unwrap();
        assert_eq!(by_token.id, approved.id);
        assert_eq!(by_token.status, BotStatus::Revoked);

        // Consumed codes stay reserved.
        assert!(store.create_bot(new_bot("AAAABBBB")).await.unwrap().is_none());
        assert!(store.find_by_pairing_code("EEEEFFFF").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_lookup_keys_are_unique() {
        let store = MemoryBotStore::new();
        let first = store.create_bot(new_bot("GGGGHHHH")).await.unwrap().unwrap();
        let second = store.create_bot(new_bot("IIIIJJJJ")).await.unwrap().unwrap();

        store.approve_bot(first.id, approval("shared")).await.unwrap().unwrap();
        assert!(store.approve_bot(second.id, approval("shared")).await.is_err());

        let second = store.get_bot(second.id).await.unwrap().unwrap();
        assert_eq!(second.status, BotStatus::Pending);
        assert_eq!(store.find_by_token_lookup("shared").await.unwrap().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn concurrent_approvals_have_one_winner() {
        let store = Arc::new(MemoryBotStore::new());
        let bot = store.create_bot(new_bot("POIUYTRE")).await.unwrap().unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.approve_bot(bot.id, approval(&format!("k{i}"))).await.unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn audit_entries_come_back_newest_first() {
        let store = MemoryAuditStore::new();
        let bot_id = Uuid::now_v7();
        for i in 0..5u16 {
            store
                .append(&BotRequestLogEntry {
                    id: Uuid::now_v7(),
                    bot_id: Some(bot_id),
                    endpoint: format!("/e/{i}"),
                    method: "GET".into(),
                    status_code: 200,
                    ip_address: "127.0.0.1".into(),
                    user_agent: None,
                    response_time_ms: 1,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let page = store
            .list_for_bot(bot_id, AuditPage { limit: 2, offset: 1 })
            .await
            .unwrap();
        let endpoints: Vec<_> = page.iter().map(|e| e.endpoint.as_str()).collect();
        assert_eq!(endpoints, ["/e/3", "/e/2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn counter_window_resets() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);

        assert_eq!(store.increment("register:1.2.3.4", window).await.unwrap().count, 1);
        assert_eq!(store.increment("register:1.2.3.4", window).await.unwrap().count, 2);
        assert_eq!(store.increment("register:5.6.7.8", window).await.unwrap().count, 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.purge_expired(), 2);

        let fresh = store.increment("register:1.2.3.4", window).await.unwrap();
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.resets_in, window);
    }

    #[tokio::test]
    async fn allowlist_duplicates_and_revocation() {
        let store = MemoryAllowlistStore::new();
        let now = Utc::now();
        let new = NewAllowlistEntry {
            id: Uuid::now_v7(),
            platform: "discord".into(),
            platform_user_id: "42".into(),
            platform_username: None,
            tier: Tier::WriteLimited,
            reason: None,
            added_by: "admin".into(),
            expires_at: None,
            metadata: serde_json::json!({}),
            created_at: now,
        };

        let entry = store.create_entry(new.clone()).await.unwrap().unwrap();
        assert!(store
            .create_entry(NewAllowlistEntry { id: Uuid::now_v7(), ..new.clone() })
            .await
            .unwrap()
            .is_none());

        assert!(store.find_active("discord", "42", now).await.unwrap().is_some());
        store.revoke_entry(entry.id, "admin", None, now).await.unwrap().unwrap();
        assert!(store.find_active("discord", "42", now).await.unwrap().is_none());
        assert!(store.revoke_entry(entry.id, "admin", None, now).await.unwrap().is_none());
        assert_eq!(store.list_entries(true, now).await.unwrap().len(), 1);
        assert!(store.list_entries(false, now).await.unwrap().is_empty());
    }
}
