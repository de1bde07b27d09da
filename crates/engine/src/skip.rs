//! Skip-condition evaluation.

use tracing::{debug, warn};

use dispatch_core::types::SkipCondition;
use dispatch_store::RecordStore;

/// Decide whether a step's message should be suppressed for this user.
///
/// Fetches at most one row from `condition.table` where
/// `condition.user_field == user_id` and compares `condition.check_field`
/// against `condition.check_value`.
///
/// Fail-open: a lookup error, or an enrollment with no user reference,
/// yields "do not skip" — a transient datastore error makes the message
/// send rather than vanish silently.
pub fn should_skip(
    records: &dyn RecordStore,
    condition: &SkipCondition,
    user_id: Option<&str>,
) -> bool {
    let user_id = match user_id {
        Some(id) => id,
        None => {
            debug!(table = %condition.table, "Skip condition with no user reference, not skipping");
            return false;
        }
    };

    match records.find_by_field(&condition.table, &condition.user_field, user_id) {
        Ok(Some(row)) => {
            let matched = row.get(&condition.check_field).map(String::as_str)
                == Some(condition.check_value.as_str());
            if matched {
                debug!(
                    table = %condition.table,
                    user_id,
                    field = %condition.check_field,
                    "Skip condition matched"
                );
            }
            matched
        }
        Ok(None) => false,
        Err(e) => {
            warn!(
                table = %condition.table,
                user_id,
                error = %e,
                "Skip condition lookup failed, treating as do-not-skip"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_store::{InMemoryRecordStore, Record};

    struct BrokenRecordStore;

    impl RecordStore for BrokenRecordStore {
        fn find_by_field(&self, _: &str, _: &str, _: &str) -> anyhow::Result<Option<Record>> {
            anyhow::bail!("connection refused")
        }
    }

    fn condition() -> SkipCondition {
        SkipCondition {
            table: "orders".to_string(),
            user_field: "user_id".to_string(),
            check_field: "status".to_string(),
            check_value: "purchased".to_string(),
        }
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_skip_when_row_matches() {
        let records = InMemoryRecordStore::new();
        records.insert(
            "orders",
            record(&[("user_id", "u1"), ("status", "purchased")]),
        );
        assert!(should_skip(&records, &condition(), Some("u1")));
    }

    #[test]
    fn test_no_skip_when_value_differs_or_row_missing() {
        let records = InMemoryRecordStore::new();
        records.insert("orders", record(&[("user_id", "u1"), ("status", "open")]));
        assert!(!should_skip(&records, &condition(), Some("u1")));
        assert!(!should_skip(&records, &condition(), Some("u2")));
    }

    #[test]
    fn test_lookup_error_fails_open() {
        assert!(!should_skip(&BrokenRecordStore, &condition(), Some("u1")));
    }

    #[test]
    fn test_missing_user_reference_fails_open() {
        let records = InMemoryRecordStore::new();
        assert!(!should_skip(&records, &condition(), None));
    }
}
