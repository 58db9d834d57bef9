//! Per-IP fixed-window rate limiting for the unauthenticated pairing endpoints.
//!
//! Counters live behind [`CounterStore`] so a single instance can count in
//! process while a fleet shares Redis. Store failures fail open.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use wrbt_common::config::{RateLimitConfig, RateLimitsConfig};
use wrbt_common::error::WrbtError;
use wrbt_db::CounterStore;

use crate::{middleware::client_ip, AppState};

/// Which endpoint family a request is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Register,
    Status,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }
}

impl From<RateLimitConfig> for RateLimitPolicy {
    fn from(cfg: RateLimitConfig) -> Self {
        Self::new(cfg.max_requests, Duration::from_secs(cfg.window_secs))
    }
}

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: u64,
}

impl RateDecision {
    fn unlimited(policy: &RateLimitPolicy) -> Self {
        Self {
            allowed: true,
            limit: policy.max_requests,
            remaining: policy.max_requests,
            reset_at: Utc::now(),
            retry_after_secs: 0,
        }
    }

    /// Write `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from(self.reset_at.timestamp()),
        );
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    register: RateLimitPolicy,
    status: RateLimitPolicy,
}

impl RateLimiter {
    /// Registration: 3 per hour. Status polling: 60 per hour.
    pub const DEFAULT_REGISTER: RateLimitPolicy = RateLimitPolicy::new(3, Duration::from_secs(3_600));
    pub const DEFAULT_STATUS: RateLimitPolicy = RateLimitPolicy::new(60, Duration::from_secs(3_600));

    pub fn new(store: Arc<dyn CounterStore>, register: RateLimitPolicy, status: RateLimitPolicy) -> Self {
        Self { store, register, status }
    }

    pub fn with_defaults(store: Arc<dyn CounterStore>) -> Self {
        Self::new(store, Self::DEFAULT_REGISTER, Self::DEFAULT_STATUS)
    }

    pub fn from_config(store: Arc<dyn CounterStore>, cfg: &RateLimitsConfig) -> Self {
        Self::new(store, cfg.register.into(), cfg.status.into())
    }

    pub fn policy(&self, bucket: Bucket) -> &RateLimitPolicy {
        match bucket {
            Bucket::Register => &self.register,
            Bucket::Status => &self.status,
        }
    }

    /// Count one request from `ip` against `bucket`.
    pub async fn allow(&self, ip: &str, bucket: Bucket) -> RateDecision {
        let policy = *self.policy(bucket);
        let key = format!("{}:{ip}", bucket.as_str());

        let window = match self.store.increment(&key, policy.window).await {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(bucket = bucket.as_str(), error = %e, "Rate-limit store unavailable; allowing request");
                return RateDecision::unlimited(&policy);
            }
        };

        let limit = u64::from(policy.max_requests);
        let reset_at = Utc::now()
            + chrono::Duration::from_std(window.resets_in).unwrap_or_else(|_| chrono::Duration::zero());
        let retry_after_secs = window.resets_in.as_secs_f64().ceil().max(1.0) as u64;

        RateDecision {
            allowed: window.count <= limit,
            limit: policy.max_requests,
            remaining: limit.saturating_sub(window.count) as u32,
            reset_at,
            retry_after_secs,
        }
    }
}

/// Middleware enforcing one bucket. Build with
/// `middleware::from_fn_with_state((state, Bucket::Register), enforce)`.
pub async fn enforce(
    State((state, bucket)): State<(Arc<AppState>, Bucket)>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request, state.settings.trust_forwarded_for);
    let decision = state.limiter.allow(&ip, bucket).await;

    if !decision.allowed {
        tracing::warn!(bucket = bucket.as_str(), ip = %ip, "Rate limit exceeded");
        let mut response = WrbtError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        }
        .into_response();
        decision.apply_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    decision.apply_headers(response.headers_mut());
    response
}
