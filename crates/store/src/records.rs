//! External record lookup used by skip conditions.
//!
//! A skip condition names a table and a column pair at runtime; the engine
//! only ever needs "at most one row where `field = value`". The trait keeps
//! that surface minimal so production backends (SQL, REST) and the in-memory
//! test double stay interchangeable.

use std::collections::HashMap;

use dashmap::DashMap;

/// A flat row from an external table.
pub type Record = HashMap<String, String>;

/// Fetch-one-row contract consumed by the skip-condition evaluator.
pub trait RecordStore: Send + Sync {
    /// At most one row from `table` where `field == value`. `Ok(None)` when
    /// nothing matches; `Err` signals a lookup failure the caller must treat
    /// as uncertainty, not absence.
    fn find_by_field(&self, table: &str, field: &str, value: &str)
        -> anyhow::Result<Option<Record>>;
}

/// In-memory record store keyed by table name.
pub struct InMemoryRecordStore {
    tables: DashMap<String, Vec<Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    pub fn insert(&self, table: &str, record: Record) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(record);
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find_by_field(
        &self,
        table: &str,
        field: &str,
        value: &str,
    ) -> anyhow::Result<Option<Record>> {
        let rows = match self.tables.get(table) {
            Some(rows) => rows,
            None => return Ok(None),
        };
        Ok(rows
            .iter()
            .find(|r| r.get(field).map(String::as_str) == Some(value))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_find_by_field() {
        let store = InMemoryRecordStore::new();
        store.insert("orders", record(&[("user_id", "u1"), ("status", "paid")]));
        store.insert("orders", record(&[("user_id", "u2"), ("status", "open")]));

        let row = store.find_by_field("orders", "user_id", "u2").unwrap();
        assert_eq!(row.unwrap().get("status").unwrap(), "open");

        assert!(store
            .find_by_field("orders", "user_id", "u9")
            .unwrap()
            .is_none());
        assert!(store
            .find_by_field("missing_table", "user_id", "u1")
            .unwrap()
            .is_none());
    }
}
