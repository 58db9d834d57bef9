//! Allowlist: pre-approved external platform identities.
//!
//! An active entry lets a bot registering as that platform user skip manual
//! approval and receive the entry's tier straight away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::bot::Tier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub id: Uuid,
    pub platform: String,
    pub platform_user_id: String,
    pub platform_username: Option<String>,
    pub tier: Tier,
    pub reason: Option<String>,
    pub added_by: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub revoked_reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AllowlistEntry {
    /// Not revoked and not past its expiry.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|at| now < at)
    }
}

/// Admin request to pre-approve a platform identity.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAllowlistRequest {
    #[validate(length(min = 1, max = 64))]
    pub platform: String,

    #[validate(length(min = 1, max = 128))]
    pub platform_user_id: String,

    #[validate(length(max = 128))]
    pub platform_username: Option<String>,

    #[serde(default)]
    pub tier: Tier,

    #[validate(length(max = 500))]
    pub reason: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Fields required to insert an allowlist entry.
#[derive(Debug, Clone)]
pub struct NewAllowlistEntry {
    pub id: Uuid,
    pub platform: String,
    pub platform_user_id: String,
    pub platform_username: Option<String>,
    pub tier: Tier,
    pub reason: Option<String>,
    pub added_by: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RevokeAllowlistRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}
