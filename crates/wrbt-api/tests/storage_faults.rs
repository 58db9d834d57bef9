//! Behaviour when the registry or the audit sink misbehaves.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use common::TestApp;
use wrbt_api::rate_limit::RateLimitPolicy;
use wrbt_api::ApiSettings;
use wrbt_common::crypto;
use wrbt_common::models::{
    ApprovalUpdate, AuditPage, BotIdentity, BotRequestLogEntry, BotStatus, NewBot,
    RevocationUpdate,
};
use wrbt_db::{AuditStore, BotStore, MemoryBotStore};

const STALL: Duration = Duration::from_secs(60);

struct FailingAudit;

#[async_trait]
impl AuditStore for FailingAudit {
    async fn append(&self, _entry: &BotRequestLogEntry) -> Result<()> {
        anyhow::bail!("audit table is gone")
    }

    async fn list_for_bot(&self, _bot_id: Uuid, _page: AuditPage) -> Result<Vec<BotRequestLogEntry>> {
        anyhow::bail!("audit table is gone")
    }
}

struct StalledAudit;

#[async_trait]
impl AuditStore for StalledAudit {
    async fn append(&self, _entry: &BotRequestLogEntry) -> Result<()> {
        tokio::time::sleep(STALL).await;
        Ok(())
    }

    async fn list_for_bot(&self, _bot_id: Uuid, _page: AuditPage) -> Result<Vec<BotRequestLogEntry>> {
        Ok(Vec::new())
    }
}

/// In-memory registry whose approval or token lookup hangs.
#[derive(Default)]
struct StalledBots {
    inner: MemoryBotStore,
    stall_approve: bool,
    stall_lookup: bool,
}

#[async_trait]
impl BotStore for StalledBots {
    async fn create_bot(&self, bot: NewBot) -> Result<Option<BotIdentity>> {
        self.inner.create_bot(bot).await
    }

    async fn get_bot(&self, id: Uuid) -> Result<Option<BotIdentity>> {
        self.inner.get_bot(id).await
    }

    async fn find_by_pairing_code(&self, code: &str) -> Result<Option<BotIdentity>> {
        self.inner.find_by_pairing_code(code).await
    }

    async fn find_by_token_lookup(&self, lookup: &str) -> Result<Option<BotIdentity>> {
        if self.stall_lookup {
            tokio::time::sleep(STALL).await;
        }
        self.inner.find_by_token_lookup(lookup).await
    }

    async fn list_bots(&self, status: Option<BotStatus>) -> Result<Vec<BotIdentity>> {
        self.inner.list_bots(status).await
    }

    async fn approve_bot(&self, id: Uuid, update: ApprovalUpdate) -> Result<Option<BotIdentity>> {
        if self.stall_approve {
            tokio::time::sleep(STALL).await;
        }
        self.inner.approve_bot(id, update).await
    }

    async fn revoke_bot(&self, id: Uuid, update: RevocationUpdate) -> Result<Option<BotIdentity>> {
        self.inner.revoke_bot(id, update).await
    }

    async fn update_profile(
        &self,
        id: Uuid,
        contact_email: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<BotIdentity>> {
        self.inner.update_profile(id, contact_email, user_agent, now).await
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn settings(storage_timeout: Duration) -> ApiSettings {
    ApiSettings { storage_timeout, ..ApiSettings::default() }
}

fn open_registration() -> RateLimitPolicy {
    RateLimitPolicy::new(1_000, Duration::from_secs(3_600))
}

#[tokio::test]
async fn failing_audit_sink_never_changes_responses() {
    let app = TestApp::with_backends(
        settings(Duration::from_secs(5)),
        open_registration(),
        Arc::new(MemoryBotStore::new()),
        Some(Arc::new(FailingAudit)),
    );
    let (_, token) = app.approved_bot("TestBot", None).await;

    let ok = app.send(Method::GET, "/api/v1/bots/me", Some(&token), None).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["name"], "TestBot");

    let unknown = crypto::generate_api_key();
    let denied = app.send(Method::GET, "/api/v1/bots/me", Some(&unknown), None).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body["reason"], "token_invalid");
}

#[tokio::test]
async fn stalled_audit_sink_does_not_delay_responses() {
    let app = TestApp::with_backends(
        settings(Duration::from_secs(5)),
        open_registration(),
        Arc::new(MemoryBotStore::new()),
        Some(Arc::new(StalledAudit)),
    );
    let (_, token) = app.approved_bot("TestBot", None).await;

    let ok = tokio::time::timeout(
        Duration::from_secs(1),
        app.send(Method::GET, "/api/v1/bots/me", Some(&token), None),
    )
    .await
    .expect("response waited on the audit write");
    assert_eq!(ok.status, StatusCode::OK);

    let unknown = crypto::generate_api_key();
    let denied = tokio::time::timeout(
        Duration::from_secs(1),
        app.send(Method::GET, "/api/v1/bots/me", Some(&unknown), None),
    )
    .await
    .expect("denial waited on the audit write");
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stalled_approval_is_unavailable_and_issues_no_token() {
    let bots = StalledBots { stall_approve: true, ..Default::default() };
    let app = TestApp::with_backends(
        settings(Duration::from_millis(200)),
        open_registration(),
        Arc::new(bots),
        None,
    );
    let (bot_id, code) = app.register_pending("SlowBot").await;

    let res = app.approve(&bot_id, None).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["error"], "SERVICE_UNAVAILABLE");
    assert!(res.body.get("token").is_none());
    assert!(!res.body.to_string().contains("wrbt_"));

    let status = app.status(&code).await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["status"], "pending");
}

#[tokio::test]
async fn stalled_token_lookup_is_unavailable_and_audited() {
    let bots = StalledBots { stall_lookup: true, ..Default::default() };
    let app = TestApp::with_backends(
        settings(Duration::from_millis(200)),
        open_registration(),
        Arc::new(bots),
        None,
    );
    let (_, token) = app.approved_bot("SlowBot", None).await;

    let res = app.send(Method::GET, "/api/v1/bots/me", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["error"], "SERVICE_UNAVAILABLE");

    let entries = app.audit.all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].bot_id, None);
    assert_eq!(entries[0].status_code, 503);
    assert_eq!(entries[0].endpoint, "/api/v1/bots/me");
}
