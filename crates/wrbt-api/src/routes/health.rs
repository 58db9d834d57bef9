//! Liveness and readiness probes for load balancers and orchestrators.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
}

async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Ready once the bot registry answers within the storage timeout.
async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let ready = tokio::time::timeout(
        state.settings.storage_timeout,
        state.stores.bots.health_check(),
    )
    .await
    .unwrap_or(false);

    let (code, status) = if ready {
        (StatusCode::OK, "ready")
    } else {
        tracing::warn!("Readiness check failed: bot registry unreachable");
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
