//! Bot request audit log.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use wrbt_common::error::WrbtResult;
use wrbt_common::models::{AuditPage, BotRequestLogEntry};
use wrbt_common::ids;

use crate::AppState;

/// What the authenticator knows about a request when it logs it.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub endpoint: String,
    pub method: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl RequestInfo {
    pub fn entry(&self, bot_id: Option<Uuid>, status_code: u16, response_time_ms: u64) -> BotRequestLogEntry {
        BotRequestLogEntry {
            id: ids::new_id(),
            bot_id,
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            status_code,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            response_time_ms,
            created_at: Utc::now(),
        }
    }
}

/// Append an entry on a background task. Failures and timeouts are logged
/// and swallowed; auditing never delays or changes the response.
pub fn record(state: &Arc<AppState>, entry: BotRequestLogEntry) {
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = state.storage(state.stores.audit.append(&entry)).await {
            tracing::error!(
                bot_id = ?entry.bot_id,
                endpoint = %entry.endpoint,
                error = %e,
                "Failed to write bot request audit entry"
            );
        }
    });
}

/// Entries for one bot, newest first. `limit` is clamped to `1..=100`.
pub async fn query(state: &AppState, bot_id: Uuid, page: AuditPage) -> WrbtResult<Vec<BotRequestLogEntry>> {
    state
        .storage(state.stores.audit.list_for_bot(bot_id, page.clamped()))
        .await
}
