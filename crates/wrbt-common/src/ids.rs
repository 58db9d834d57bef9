//! Record identifiers and approver labels.

use uuid::Uuid;

/// `approved_by` prefix for bots approved through an allowlist entry rather
/// than by an admin.
pub const ALLOWLIST_APPROVER_PREFIX: &str = "allowlist:";

/// New record id. UUID v7, so ids sort by creation time.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

/// `approved_by` value recorded when an allowlist entry approves a bot.
pub fn allowlist_approver(entry_id: Uuid) -> String {
    format!("{ALLOWLIST_APPROVER_PREFIX}{entry_id}")
}

/// The allowlist entry behind an `approved_by` value, if an entry approved it.
pub fn allowlist_entry_of(approved_by: &str) -> Option<Uuid> {
    approved_by
        .strip_prefix(ALLOWLIST_APPROVER_PREFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_sort_by_creation() {
        let first = new_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = new_id();
        assert!(first < second);
    }

    #[test]
    fn allowlist_approver_round_trips() {
        let entry = new_id();
        let label = allowlist_approver(entry);
        assert!(label.starts_with("allowlist:"));
        assert_eq!(allowlist_entry_of(&label), Some(entry));
        assert_eq!(allowlist_entry_of("admin@example.com"), None);
        assert_eq!(allowlist_entry_of("allowlist:not-a-uuid"), None);
    }
}
