//! Shared harness: an in-memory router driven with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use wrbt_api::rate_limit::{RateLimitPolicy, RateLimiter};
use wrbt_api::{build_router, ApiSettings, AppState};
use wrbt_common::crypto::HashingPolicy;
use wrbt_db::{
    AuditStore, BotStore, MemoryAllowlistStore, MemoryAuditStore, MemoryBotStore, MemoryCounterStore,
    Stores,
};

pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub struct TestApp {
    pub router: Router,
    pub audit: Arc<MemoryAuditStore>,
    pub admin_token: String,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    /// Registration limit raised so tests can register freely.
    pub fn new() -> Self {
        Self::with(
            ApiSettings::default(),
            RateLimitPolicy::new(1_000, Duration::from_secs(3_600)),
        )
    }

    pub fn with(settings: ApiSettings, register_policy: RateLimitPolicy) -> Self {
        Self::with_backends(settings, register_policy, Arc::new(MemoryBotStore::new()), None)
    }

    /// Run against the given registry. Audit entries go to `audit_sink` when
    /// set, otherwise to the in-memory log exposed as `self.audit`.
    pub fn with_backends(
        settings: ApiSettings,
        register_policy: RateLimitPolicy,
        bots: Arc<dyn BotStore>,
        audit_sink: Option<Arc<dyn AuditStore>>,
    ) -> Self {
        let audit = Arc::new(MemoryAuditStore::new());
        let counters = Arc::new(MemoryCounterStore::new());
        let stores = Stores {
            bots,
            audit: audit_sink.unwrap_or_else(|| audit.clone() as Arc<dyn AuditStore>),
            allowlist: Arc::new(MemoryAllowlistStore::new()),
            counters: counters.clone(),
            memory_counters: Some(counters.clone()),
        };

        let limiter = RateLimiter::new(counters, register_policy, RateLimiter::DEFAULT_STATUS);
        let settings = ApiSettings {
            jwt_secret: JWT_SECRET.to_string(),
            ..settings
        };
        let state = AppState::new(stores, HashingPolicy::Plaintext, limiter, settings);

        Self {
            router: build_router(state),
            audit,
            admin_token: wrbt_api::auth::generate_admin_token("alice", JWT_SECRET, 3_600)
                .unwrap(),
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("user-agent", "wrbt-tests/1.0");
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        settle().await;
        Response { status, headers, body }
    }

    pub async fn register(&self, body: Value) -> Response {
        self.send(Method::POST, "/api/v1/bots/register", None, Some(body)).await
    }

    pub async fn status(&self, code: &str) -> Response {
        self.send(Method::GET, &format!("/api/v1/bots/status/{code}"), None, None)
            .await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let token = self.admin_token.clone();
        self.send(method, uri, Some(&token), body).await
    }

    pub async fn approve(&self, bot_id: &str, body: Option<Value>) -> Response {
        self.admin(Method::POST, &format!("/api/v1/admin/bots/{bot_id}/approve"), body)
            .await
    }

    pub async fn revoke(&self, bot_id: &str, body: Option<Value>) -> Response {
        self.admin(Method::POST, &format!("/api/v1/admin/bots/{bot_id}/revoke"), body)
            .await
    }

    /// Register a bot and return `(bot_id, pairing_code)`.
    pub async fn register_pending(&self, name: &str) -> (String, String) {
        let reg = self.register(serde_json::json!({ "name": name })).await;
        assert_eq!(reg.status, StatusCode::CREATED, "{:?}", reg.body);
        let code = reg.body["pairing_code"].as_str().unwrap().to_string();

        let list = self
            .admin(Method::GET, "/api/v1/admin/bots?status=pending", None)
            .await;
        let bot_id = list.body["bots"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["pairing_code"] == code.as_str())
            .map(|b| b["id"].as_str().unwrap().to_string())
            .unwrap();
        (bot_id, code)
    }

    /// Register and approve a bot. Returns `(bot_id, token)`.
    pub async fn approved_bot(&self, name: &str, tier: Option<&str>) -> (String, String) {
        let (bot_id, _) = self.register_pending(name).await;
        let body = tier.map(|t| serde_json::json!({ "tier": t }));
        let approved = self.approve(&bot_id, body).await;
        assert_eq!(approved.status, StatusCode::OK, "{:?}", approved.body);
        (bot_id, approved.body["token"].as_str().unwrap().to_string())
    }
}

/// Let detached tasks (audit writes) queued by the last request run.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
