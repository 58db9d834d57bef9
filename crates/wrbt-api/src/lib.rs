//! # wrbt-api
//!
//! REST API layer for WRBT. Bot pairing, admin approval, bearer-token
//! authentication and request auditing.

pub mod audit;
pub mod auth;
pub mod middleware;
pub mod pairing;
pub mod rate_limit;
pub mod routes;

use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use wrbt_common::config::AppConfig;
use wrbt_common::crypto::{HashingPolicy, DEFAULT_PAIRING_TTL_SECS};
use wrbt_common::error::{WrbtError, WrbtResult};
use wrbt_db::Stores;

use crate::rate_limit::RateLimiter;

/// Tunables the handlers need, resolved once from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// HS256 secret for admin JWTs.
    pub jwt_secret: String,
    pub pairing_code_length: usize,
    pub pairing_ttl: chrono::Duration,
    /// Upper bound on each registry / audit call.
    pub storage_timeout: Duration,
    pub trust_forwarded_for: bool,
}

impl ApiSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            jwt_secret: config.auth.jwt_secret.clone(),
            pairing_code_length: config.auth.pairing_code_length,
            pairing_ttl: chrono::Duration::seconds(config.auth.pairing_ttl_secs),
            storage_timeout: config.storage.timeout(),
            trust_forwarded_for: config.network.trust_forwarded_for,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            pairing_code_length: wrbt_common::crypto::MAX_PAIRING_CODE_LEN,
            pairing_ttl: chrono::Duration::seconds(DEFAULT_PAIRING_TTL_SECS),
            storage_timeout: Duration::from_secs(5),
            trust_forwarded_for: false,
        }
    }
}

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    /// Secret hashing policy, fixed at startup.
    pub hashing: HashingPolicy,
    pub limiter: RateLimiter,
    pub settings: ApiSettings,
}

impl AppState {
    pub fn new(stores: Stores, hashing: HashingPolicy, limiter: RateLimiter, settings: ApiSettings) -> Self {
        Self { stores, hashing, limiter, settings }
    }

    /// Run a storage call under the configured timeout. Elapsing maps to
    /// [`WrbtError::Unavailable`]; backend errors become internal errors.
    pub async fn storage<T, F>(&self, call: F) -> WrbtResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.settings.storage_timeout, call).await {
            Ok(result) => result.map_err(WrbtError::from),
            Err(_) => {
                tracing::error!(timeout_ms = self.settings.storage_timeout.as_millis() as u64, "Storage call timed out");
                Err(WrbtError::Unavailable)
            }
        }
    }
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let api_routes = Router::new()
        .merge(routes::bots::router(state.clone()))
        .merge(routes::admin::router(state.clone()))
        .merge(routes::allowlist::router(state.clone()))
        .merge(routes::health::router());

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::limit::RequestBodyLimitLayer::new(64 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
