use std::collections::HashMap;

use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

use crate::model::operation_type::OperationType;
use crate::model::source_value::{ColumnTypeHint, SourceValue};
use crate::model::table_identifier::TableIdentifier;

/// One record as decoded by a `SourceStrategy`, before normalization,
/// schema tracking, or `ChangeEvent` construction (spec §4.4). The
/// strategy's only job is to produce these; everything downstream is
/// driver-agnostic and lives in the adapter that owns the strategy.
#[derive(Debug, Clone)]
pub struct RawChange {
    pub table: TableIdentifier,
    pub operation: OperationType,
    pub source_partition: String,
    pub offset_fields: JsonMap<String, JsonValue>,
    pub sequence: i64,
    pub before: Option<HashMap<String, (ColumnTypeHint, SourceValue)>>,
    pub after: Option<HashMap<String, (ColumnTypeHint, SourceValue)>>,
    /// Set by the strategy for rows produced during the initial-snapshot
    /// phase (spec §4.4).
    pub snapshot: bool,
}
