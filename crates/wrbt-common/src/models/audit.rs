//! Audit records for requests made against bot-protected endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One immutable row of the bot request log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRequestLogEntry {
    pub id: Uuid,
    /// `None` when authentication failed before an identity was resolved.
    pub bot_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub response_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Pagination for audit queries.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AuditPage {
    #[serde(default = "AuditPage::default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl AuditPage {
    pub const MAX_LIMIT: u32 = 100;

    fn default_limit() -> u32 {
        50
    }

    /// Clamp `limit` to `1..=MAX_LIMIT`.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            offset: self.offset,
        }
    }
}

impl Default for AuditPage {
    fn default() -> Self {
        Self { limit: Self::default_limit(), offset: 0 }
    }
}
