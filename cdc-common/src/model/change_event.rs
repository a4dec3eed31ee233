use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::err::ReError;
use crate::model::operation_type::OperationType;
use crate::model::position::Position;
use crate::model::row_data::RowData;
use crate::model::table_identifier::TableIdentifier;

/// `metadata.schemaVersion` is fixed at 1 for the lifetime of this wire
/// format; a new value would be a breaking change to consumers.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub source: String,
    pub version: String,
    pub connector: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// Set on rows produced by the initial-snapshot phase (spec §4.4); a
    /// consumer-visible hint, not a distinct `OperationType`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub snapshot: bool,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>, version: impl Into<String>, connector: impl Into<String>) -> Self {
        EventMetadata { source: source.into(), version: version.into(), connector: connector.into(), schema_version: SCHEMA_VERSION, snapshot: false }
    }

    pub fn snapshot(mut self) -> Self {
        self.snapshot = true;
        self
    }
}

/// One committed row change, normalized to the canonical wire shape (spec
/// §3/§6). Constructed only through `ChangeEvent::new`, which enforces the
/// before/after invariants; a `ChangeEvent` that violates them simply
/// cannot exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: TableIdentifier,
    pub operation: OperationType,
    #[serde(with = "crate::iso8601")]
    pub timestamp: DateTime<Utc>,
    pub position: Position,
    pub before: Option<RowData>,
    pub after: Option<RowData>,
    pub metadata: EventMetadata,
}

impl ChangeEvent {
    pub fn new(
        table: TableIdentifier,
        operation: OperationType,
        timestamp: DateTime<Utc>,
        position: Position,
        before: Option<RowData>,
        after: Option<RowData>,
        metadata: EventMetadata,
    ) -> Result<Self, ReError> {
        match operation {
            OperationType::Insert => {
                if before.is_some() || after.is_none() {
                    return Err(ReError::SerializationError(format!(
                        "INSERT event for {} must have before=None and after=Some",
                        table
                    )));
                }
            }
            OperationType::Update => {
                if before.is_none() || after.is_none() {
                    return Err(ReError::SerializationError(format!(
                        "UPDATE event for {} must have before=Some and after=Some",
                        table
                    )));
                }
            }
            OperationType::Delete => {
                if before.is_none() || after.is_some() {
                    return Err(ReError::SerializationError(format!(
                        "DELETE event for {} must have before=Some and after=None",
                        table
                    )));
                }
            }
            OperationType::Unknown => {
                return Err(ReError::SerializationError(format!("unknown operation for {}", table)));
            }
        }

        Ok(ChangeEvent { table, operation, timestamp, position, before, after, metadata })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use serde_json::Map;

    use crate::model::position::Position;
    use crate::model::row_data::{RowData, Value};

    use super::*;

    fn row() -> RowData {
        let mut cols = HashMap::new();
        cols.insert("id".to_string(), Value::Integer(1));
        RowData::new(cols)
    }

    fn meta() -> EventMetadata {
        EventMetadata::new("postgres-host-db", "0.1.0", "postgres")
    }

    fn pos() -> Position {
        Position::new("postgres-host-db", Map::new(), 1)
    }

    fn table() -> TableIdentifier {
        TableIdentifier::without_schema("cdcdb", "orders")
    }

    #[test]
    fn insert_requires_no_before_and_some_after() {
        let ok = ChangeEvent::new(table(), OperationType::Insert, Utc::now(), pos(), None, Some(row()), meta());
        assert!(ok.is_ok());

        let bad = ChangeEvent::new(table(), OperationType::Insert, Utc::now(), pos(), Some(row()), Some(row()), meta());
        assert!(bad.is_err());
    }

    #[test]
    fn update_requires_both_before_and_after() {
        let ok = ChangeEvent::new(table(), OperationType::Update, Utc::now(), pos(), Some(row()), Some(row()), meta());
        assert!(ok.is_ok());

        let bad = ChangeEvent::new(table(), OperationType::Update, Utc::now(), pos(), None, Some(row()), meta());
        assert!(bad.is_err());
    }

    #[test]
    fn delete_requires_before_and_no_after() {
        let ok = ChangeEvent::new(table(), OperationType::Delete, Utc::now(), pos(), Some(row()), None, meta());
        assert!(ok.is_ok());

        let bad = ChangeEvent::new(table(), OperationType::Delete, Utc::now(), pos(), Some(row()), Some(row()), meta());
        assert!(bad.is_err());
    }

    #[test]
    fn timestamp_serializes_with_z_suffix() {
        let event = ChangeEvent::new(table(), OperationType::Insert, Utc::now(), pos(), None, Some(row()), meta()).unwrap();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Z\""));
    }
}
