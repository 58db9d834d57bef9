//! Middleware: bot token authentication, admin JWT checks, client IP
//! resolution and security headers.

use axum::{
    extract::{ConnectInfo, FromRequestParts, OriginalUri, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use wrbt_common::crypto;
use wrbt_common::error::{ForbiddenReason, WrbtError, WrbtResult};
use wrbt_common::models::{BotIdentity, BotStatus, Tier};

use crate::audit::{self, RequestInfo};
use crate::pairing::{self, ClientContext};
use crate::{auth, AppState};

const MISSING_TOKEN: &str = "missing token";

/// Identity of an approved bot, available to handlers behind
/// [`bot_auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedBot {
    pub id: Uuid,
    pub name: String,
    pub tier: Tier,
}

impl AuthenticatedBot {
    /// Refuse the call unless this bot's tier covers `required`.
    pub fn require_tier(&self, required: Tier) -> Result<(), WrbtError> {
        if self.tier.permits(required) {
            Ok(())
        } else {
            tracing::warn!(bot_id = %self.id, tier = self.tier.as_str(), required = required.as_str(), "Bot tier too low");
            Err(WrbtError::forbidden(ForbiddenReason::InsufficientTier))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedBot {
    type Rejection = WrbtError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedBot>()
            .cloned()
            .ok_or_else(|| WrbtError::Unauthorized { reason: MISSING_TOKEN.into() })
    }
}

/// The admin behind a verified admin JWT.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub subject: String,
}

impl<S: Send + Sync> FromRequestParts<S> for AdminContext {
    type Rejection = WrbtError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminContext>()
            .cloned()
            .ok_or_else(|| WrbtError::forbidden(ForbiddenReason::AdminRequired))
    }
}

// ── Request helpers ───────────────────────────────────────────────────────────

/// Token from `Authorization: Bearer <token>`, if the header has that shape.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Best-effort client address. `X-Forwarded-For` is honoured only when the
/// deployment sits behind a trusted proxy.
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> String {
    resolve_ip(request.headers(), request.extensions(), trust_forwarded_for)
}

fn resolve_ip(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
        .flatten();

    forwarded
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl FromRequestParts<Arc<AppState>> for ClientContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientContext {
            ip: resolve_ip(&parts.headers, &parts.extensions, state.settings.trust_forwarded_for),
            user_agent: user_agent(&parts.headers),
        })
    }
}

fn request_info(request: &Request, trust_forwarded_for: bool) -> RequestInfo {
    let endpoint = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    RequestInfo {
        endpoint,
        method: request.method().to_string(),
        ip_address: client_ip(request, trust_forwarded_for),
        user_agent: user_agent(request.headers()),
    }
}

// ── Bot authentication ────────────────────────────────────────────────────────

/// Refusal for a token that reached the registry: the bot it names, if any.
type Denial = (Option<Uuid>, ForbiddenReason);

/// Resolve a well-formed token to an approved bot.
async fn resolve_bot(state: &AppState, token: String) -> WrbtResult<Result<BotIdentity, Denial>> {
    let lookup = crypto::token_lookup_key(&token);
    let Some(bot) = state
        .storage(state.stores.bots.find_by_token_lookup(&lookup))
        .await?
    else {
        return Ok(Err((None, ForbiddenReason::TokenInvalid)));
    };

    match bot.status {
        BotStatus::Approved => {
            let verified = match bot.token_hash.clone() {
                Some(stored) => pairing::verify_secret(state, token, stored).await?,
                None => false,
            };
            Ok(if verified {
                Ok(bot)
            } else {
                Err((None, ForbiddenReason::TokenInvalid))
            })
        }
        BotStatus::Revoked => Ok(Err((Some(bot.id), ForbiddenReason::Revoked))),
        BotStatus::Pending => Ok(Err((Some(bot.id), ForbiddenReason::Pending))),
    }
}

/// Authenticate a bot bearer token and audit the request.
///
/// Malformed or missing credentials are rejected before any lookup and are
/// not audited. Everything past that point writes exactly one audit entry,
/// including requests that fail because storage is unavailable.
pub async fn bot_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, WrbtError> {
    let token = bearer_token(request.headers())
        .filter(|t| crypto::is_well_formed_api_key(t))
        .map(str::to_string)
        .ok_or_else(|| WrbtError::Unauthorized { reason: MISSING_TOKEN.into() })?;

    let started = Instant::now();
    let info = request_info(&request, state.settings.trust_forwarded_for);

    let (bot_id, response) = match resolve_bot(&state, token).await {
        Ok(Ok(bot)) => {
            request.extensions_mut().insert(AuthenticatedBot {
                id: bot.id,
                name: bot.name,
                tier: bot.tier,
            });
            (Some(bot.id), next.run(request).await)
        }
        Ok(Err((bot_id, reason))) => {
            tracing::warn!(bot_id = ?bot_id, reason = reason.as_str(), endpoint = %info.endpoint, ip = %info.ip_address, "Bot authentication denied");
            (bot_id, WrbtError::forbidden(reason).into_response())
        }
        Err(e) => {
            tracing::warn!(endpoint = %info.endpoint, error = %e, "Bot authentication could not complete");
            (None, e.into_response())
        }
    };

    let elapsed = started.elapsed().as_millis() as u64;
    audit::record(&state, info.entry(bot_id, response.status().as_u16(), elapsed));
    Ok(response)
}

// ── Admin authentication ──────────────────────────────────────────────────────

/// Require an HS256 admin access token.
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, WrbtError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| WrbtError::Unauthorized { reason: MISSING_TOKEN.into() })?;

    if state.settings.jwt_secret.is_empty() {
        tracing::warn!("Admin request refused: no JWT secret configured");
        return Err(WrbtError::Unauthorized {
            reason: "admin authentication is not configured".into(),
        });
    }

    let claims = auth::validate_token(token, &state.settings.jwt_secret)
        .map_err(|_| WrbtError::Unauthorized { reason: "invalid token".into() })?;

    if !claims.is_admin_access() {
        return Err(WrbtError::forbidden(ForbiddenReason::AdminRequired));
    }

    request
        .extensions_mut()
        .insert(AdminContext { subject: claims.sub });

    Ok(next.run(request).await)
}

// ── Security headers ──────────────────────────────────────────────────────────

/// Add defensive security headers to every HTTP response.
///
/// This is a JSON API, so the CSP forbids everything and framing is denied.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let h = response.headers_mut();

    macro_rules! set {
        ($name:expr, $val:expr) => {
            if let Ok(v) = $val.parse::<axum::http::HeaderValue>() {
                h.insert($name, v);
            }
        };
    }

    set!(
        axum::http::header::HeaderName::from_static("x-content-type-options"),
        "nosniff"
    );
    set!(
        axum::http::header::HeaderName::from_static("x-frame-options"),
        "DENY"
    );
    set!(
        axum::http::header::HeaderName::from_static("referrer-policy"),
        "no-referrer"
    );
    set!(
        axum::http::header::HeaderName::from_static("strict-transport-security"),
        "max-age=63072000; includeSubDomains"
    );
    set!(
        axum::http::header::HeaderName::from_static("content-security-policy"),
        "default-src 'none'; frame-ancestors 'none'"
    );
    set!(axum::http::header::CACHE_CONTROL, "no-store");

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/v1/bots/me");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_parsing() {
        let req = request_with(&[("authorization", "Bearer wrbt_abc")]);
        assert_eq!(bearer_token(req.headers()), Some("wrbt_abc"));

        let req = request_with(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert_eq!(bearer_token(req.headers()), None);

        let req = request_with(&[("authorization", "Bearer ")]);
        assert_eq!(bearer_token(req.headers()), None);

        assert_eq!(bearer_token(request_with(&[]).headers()), None);
    }

    #[test]
    fn forwarded_for_only_when_trusted() {
        let req = request_with(&[("x-forwarded-for", "198.51.100.4, 10.0.0.1")]);
        assert_eq!(client_ip(&req, true), "198.51.100.4");
        assert_eq!(client_ip(&req, false), "unknown");

        let mut req = request_with(&[]);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4242))));
        assert_eq!(client_ip(&req, true), "192.0.2.1");
    }

    #[test]
    fn tier_gate() {
        let bot = AuthenticatedBot {
            id: Uuid::now_v7(),
            name: "TestBot".into(),
            tier: Tier::ReadOnly,
        };
        assert!(bot.require_tier(Tier::ReadOnly).is_ok());
        let err = bot.require_tier(Tier::WriteLimited).unwrap_err();
        assert!(matches!(
            err,
            WrbtError::Forbidden { reason: ForbiddenReason::InsufficientTier }
        ));
    }
}
