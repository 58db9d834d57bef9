//! Bot identity models: the registry's records and the pairing API shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Lifecycle state of a bot identity.
///
/// Transitions only move forward: pending → approved, pending → revoked,
/// approved → revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Pending,
    Approved,
    Revoked,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Revoked => "revoked",
        }
    }
}

impl std::str::FromStr for BotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown bot status '{other}'")),
        }
    }
}

/// Coarse permission level of an approved bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    #[default]
    ReadOnly,
    WriteLimited,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "READ_ONLY",
            Self::WriteLimited => "WRITE_LIMITED",
        }
    }

    /// Whether this tier includes everything `required` allows.
    pub fn permits(&self, required: Tier) -> bool {
        *self >= required
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READ_ONLY" => Ok(Self::ReadOnly),
            "WRITE_LIMITED" => Ok(Self::WriteLimited),
            other => Err(format!("unknown tier '{other}'")),
        }
    }
}

/// A registered automated client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub user_agent: Option<String>,
    pub tier: Tier,
    pub status: BotStatus,

    /// Active pairing code; only set while pending.
    pub pairing_code: Option<String>,
    pub pairing_expires_at: Option<DateTime<Utc>>,

    /// Code consumed by approval or revocation. Lets a polling bot see the outcome; never approvable again.
    #[serde(skip_serializing)]
    pub consumed_pairing_code: Option<String>,

    /// SHA-256 of the bearer token (index key). Kept after revocation.
    #[serde(skip_serializing)]
    pub token_lookup: Option<String>,

    /// Policy hash of the bearer token. Non-null iff approved.
    #[serde(skip_serializing)]
    pub token_hash: Option<String>,

    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,

    /// Free-form bag: originating IP, platform, allowlist entry, ...
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new pending identity.
#[derive(Debug, Clone)]
pub struct NewBot {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub user_agent: Option<String>,
    pub pairing_code: String,
    pub pairing_expires_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// State written by the approval transition.
#[derive(Debug, Clone)]
pub struct ApprovalUpdate {
    pub tier: Option<Tier>,
    pub token_lookup: String,
    pub token_hash: String,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// State written by the revocation transition.
#[derive(Debug, Clone)]
pub struct RevocationUpdate {
    pub reason: Option<String>,
    pub revoked_at: DateTime<Utc>,
}

/// Descriptive fields a bot may change on itself.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBotProfileRequest {
    #[validate(email(message = "Invalid email format"))]
    pub contact_email: Option<String>,

    #[validate(length(max = 512, message = "User agent must be at most 512 characters"))]
    pub user_agent: Option<String>,
}

/// Register request body.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegisterBotRequest {
    #[validate(length(min = 3, max = 100, message = "Name must be at least 3 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub contact_email: Option<String>,

    #[validate(length(max = 512))]
    pub user_agent: Option<String>,

    /// External platform identity, used for allowlist pre-approval.
    #[validate(length(min = 1, max = 64))]
    pub platform: Option<String>,

    #[validate(length(min = 1, max = 128))]
    pub platform_user_id: Option<String>,

    #[validate(length(max = 128))]
    pub platform_username: Option<String>,
}

impl RegisterBotRequest {
    /// Trim free-text fields; blank optionals become `None`.
    pub fn normalized(mut self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }

        self.name = self.name.trim().to_string();
        self.contact_email = clean(self.contact_email);
        self.user_agent = clean(self.user_agent);
        self.platform = clean(self.platform).map(|p| p.to_lowercase());
        self.platform_user_id = clean(self.platform_user_id);
        self.platform_username = clean(self.platform_username);
        self
    }
}

/// Admin approval body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApproveBotRequest {
    pub tier: Option<Tier>,
}

/// Admin revocation body.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RevokeBotRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}
