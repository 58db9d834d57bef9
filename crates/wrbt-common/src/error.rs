//! Centralized error types for WRBT.
//!
//! Uses `thiserror` for the public taxonomy and converts straight into HTTP
//! responses. Storage and infrastructure failures arrive as `anyhow::Error`
//! and are collapsed into [`WrbtError::Internal`] so details never leave the
//! server.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Why an authenticated request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenReason {
    /// The bearer token did not match any identity.
    TokenInvalid,
    /// The identity behind the token has been revoked.
    Revoked,
    /// The identity behind the token has not been approved yet.
    Pending,
    /// The bot's tier does not allow this operation.
    InsufficientTier,
    /// An admin token is required.
    AdminRequired,
}

impl ForbiddenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenInvalid => "token_invalid",
            Self::Revoked => "revoked",
            Self::Pending => "pending",
            Self::InsufficientTier => "insufficient_tier",
            Self::AdminRequired => "admin_required",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::TokenInvalid => "Token not recognized",
            Self::Revoked => "Bot access has been revoked",
            Self::Pending => "Bot registration is still pending approval",
            Self::InsufficientTier => "Bot tier does not permit this operation",
            Self::AdminRequired => "This route requires administrator privileges",
        }
    }
}

/// Core application error type used across all WRBT crates.
#[derive(Debug, thiserror::Error)]
pub enum WrbtError {
    // === Input ===
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // === Resources ===
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    // === Pairing lifecycle ===
    #[error("Pairing code expired. Please register again.")]
    Expired,

    #[error("Bot already approved")]
    AlreadyApproved,

    #[error("Bot already revoked")]
    AlreadyRevoked,

    // === Auth ===
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Forbidden: {}", reason.message())]
    Forbidden { reason: ForbiddenReason },

    // === Rate limiting ===
    #[error("Rate limited. Retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // === Infrastructure ===
    #[error("Service temporarily unavailable")]
    Unavailable,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body sent to clients.
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<ForbiddenReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl WrbtError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn forbidden(reason: ForbiddenReason) -> Self {
        Self::Forbidden { reason }
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyExists { .. } | Self::AlreadyApproved | Self::AlreadyRevoked => {
                StatusCode::CONFLICT
            }
            Self::Expired => StatusCode::GONE,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code string for programmatic handling by clients.
    pub fn error_code(&self) -> &str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Expired => "EXPIRED",
            Self::AlreadyApproved => "ALREADY_APPROVED",
            Self::AlreadyRevoked => "ALREADY_REVOKED",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Unavailable => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a client may retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable | Self::Internal(_))
    }
}

impl IntoResponse for WrbtError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details to clients
        let message = match &self {
            WrbtError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let reason = match &self {
            WrbtError::Forbidden { reason } => Some(*reason),
            _ => None,
        };

        let retry_after = match &self {
            WrbtError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let body = ErrorResponse {
            code: status.as_u16(),
            error: self.error_code().to_string(),
            message,
            reason,
            retry_after,
        };

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Convenience type alias for Results using WrbtError.
pub type WrbtResult<T> = Result<T, WrbtError>;
