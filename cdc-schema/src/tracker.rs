use std::collections::HashMap;

use cdc_common::TableIdentifier;
use dashmap::DashMap;
use tracing::debug;

/// The declared column set of one table, as last seen by the adapter.
pub type TableSchema = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChangeKind {
    ColumnAdded,
    ColumnRemoved,
    TypeChanged,
    ColumnRenamed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaChange {
    pub table: TableIdentifier,
    pub kind: SchemaChangeKind,
    pub column: String,
    pub old_type: Option<String>,
    pub new_type: Option<String>,
}

/// In-memory registry of `TableIdentifier -> {column: type}`, single-writer
/// (the source-worker, spec §5). Detects `COLUMN_ADDED`/`COLUMN_REMOVED`/
/// `TYPE_CHANGED` by diffing the registered schema against a freshly
/// observed one; `COLUMN_RENAMED` is only ever produced explicitly by a
/// caller that has a driver-native rename notification (spec §4.6).
#[derive(Default)]
pub struct SchemaTracker {
    registered: DashMap<TableIdentifier, TableSchema>,
}

impl SchemaTracker {
    pub fn new() -> Self {
        SchemaTracker { registered: DashMap::new() }
    }

    /// Diffs `current` against the registered schema for `table`. On first
    /// sight the schema is registered silently (no changes returned). After
    /// returning non-empty changes, the registered schema is updated so the
    /// same diff is not reported again.
    pub fn observe(&self, table: &TableIdentifier, current: &TableSchema) -> Vec<SchemaChange> {
        let Some(registered) = self.registered.get(table) else {
            debug!(table = %table, "registering schema on first sight");
            self.registered.insert(table.clone(), current.clone());
            return vec![];
        };

        let mut changes = Vec::new();
        for (column, new_type) in current {
            match registered.get(column) {
                None => changes.push(SchemaChange {
                    table: table.clone(),
                    kind: SchemaChangeKind::ColumnAdded,
                    column: column.clone(),
                    old_type: None,
                    new_type: Some(new_type.clone()),
                }),
                Some(old_type) if old_type != new_type => changes.push(SchemaChange {
                    table: table.clone(),
                    kind: SchemaChangeKind::TypeChanged,
                    column: column.clone(),
                    old_type: Some(old_type.clone()),
                    new_type: Some(new_type.clone()),
                }),
                Some(_) => {}
            }
        }
        for (column, old_type) in registered.iter() {
            if !current.contains_key(column) {
                changes.push(SchemaChange {
                    table: table.clone(),
                    kind: SchemaChangeKind::ColumnRemoved,
                    column: column.clone(),
                    old_type: Some(old_type.clone()),
                    new_type: None,
                });
            }
        }

        drop(registered);
        if !changes.is_empty() {
            self.registered.insert(table.clone(), current.clone());
        }
        changes
    }

    /// Explicit rename: the driver told us `from` became `to` with the
    /// given type, rather than us inferring it as an add+remove pair.
    pub fn observe_rename(&self, table: &TableIdentifier, from: &str, to: &str, column_type: &str) -> SchemaChange {
        if let Some(mut schema) = self.registered.get_mut(table) {
            schema.remove(from);
            schema.insert(to.to_string(), column_type.to_string());
        }
        SchemaChange {
            table: table.clone(),
            kind: SchemaChangeKind::ColumnRenamed,
            column: to.to_string(),
            old_type: Some(from.to_string()),
            new_type: Some(column_type.to_string()),
        }
    }

    pub fn registered_schema(&self, table: &TableIdentifier) -> Option<TableSchema> {
        self.registered.get(table).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> TableIdentifier {
        TableIdentifier::without_schema("cdcdb", "orders")
    }

    fn schema(pairs: &[(&str, &str)]) -> TableSchema {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn first_sight_registers_silently() {
        let tracker = SchemaTracker::new();
        let changes = tracker.observe(&table(), &schema(&[("id", "INTEGER")]));
        assert!(changes.is_empty());
        assert!(tracker.registered_schema(&table()).is_some());
    }

    #[test]
    fn detects_column_added() {
        let tracker = SchemaTracker::new();
        tracker.observe(&table(), &schema(&[("id", "INTEGER")]));

        let changes = tracker.observe(&table(), &schema(&[("id", "INTEGER"), ("total", "DECIMAL")]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, SchemaChangeKind::ColumnAdded);
        assert_eq!(changes[0].column, "total");
    }

    #[test]
    fn detects_column_removed() {
        let tracker = SchemaTracker::new();
        tracker.observe(&table(), &schema(&[("id", "INTEGER"), ("legacy", "TEXT")]));

        let changes = tracker.observe(&table(), &schema(&[("id", "INTEGER")]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, SchemaChangeKind::ColumnRemoved);
        assert_eq!(changes[0].column, "legacy");
    }

    #[test]
    fn detects_type_changed() {
        let tracker = SchemaTracker::new();
        tracker.observe(&table(), &schema(&[("id", "INTEGER")]));

        let changes = tracker.observe(&table(), &schema(&[("id", "BIGINT")]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, SchemaChangeKind::TypeChanged);
        assert_eq!(changes[0].old_type.as_deref(), Some("INTEGER"));
    }

    #[test]
    fn change_is_not_re_emitted_once_registered() {
        let tracker = SchemaTracker::new();
        tracker.observe(&table(), &schema(&[("id", "INTEGER")]));
        let current = schema(&[("id", "INTEGER"), ("total", "DECIMAL")]);

        let first = tracker.observe(&table(), &current);
        assert_eq!(first.len(), 1);

        let second = tracker.observe(&table(), &current);
        assert!(second.is_empty());
    }

    #[test]
    fn explicit_rename_updates_registry() {
        let tracker = SchemaTracker::new();
        tracker.observe(&table(), &schema(&[("old_name", "TEXT")]));

        let change = tracker.observe_rename(&table(), "old_name", "new_name", "TEXT");
        assert_eq!(change.kind, SchemaChangeKind::ColumnRenamed);

        let registered = tracker.registered_schema(&table()).unwrap();
        assert!(registered.contains_key("new_name"));
        assert!(!registered.contains_key("old_name"));
    }
}
