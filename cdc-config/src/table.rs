use cdc_common::TableIdentifier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncludeMode {
    #[serde(rename = "INCLUDE_ALL")]
    IncludeAll,
    #[serde(rename = "EXCLUDE_SPECIFIED")]
    ExcludeSpecified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeKey {
    #[serde(rename = "columnNames")]
    pub column_names: Vec<String>,
}

/// One entry of the `tables:` list (spec §6). `name` is `"schema.table"` or
/// `"table"` as written by the operator; resolving it to a `TableIdentifier`
/// requires the owning `DatabaseSpec.database`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRule {
    pub name: String,
    #[serde(default = "default_include_mode", rename = "includeMode")]
    pub include_mode: IncludeMode,
    #[serde(default, rename = "columnFilter", skip_serializing_if = "Option::is_none")]
    pub column_filter: Option<Vec<String>>,
    #[serde(default, rename = "compositeKey", skip_serializing_if = "Option::is_none")]
    pub composite_key: Option<CompositeKey>,
}

fn default_include_mode() -> IncludeMode {
    IncludeMode::IncludeAll
}

impl TableRule {
    pub fn table_identifier(&self, database: &str) -> TableIdentifier {
        TableIdentifier::parse_rule(database, &self.name)
    }

    /// `true` when `column` should be captured under this rule's filter.
    pub fn includes_column(&self, column: &str) -> bool {
        match (&self.include_mode, &self.column_filter) {
            (IncludeMode::IncludeAll, None) => true,
            (IncludeMode::IncludeAll, Some(filter)) => filter.iter().any(|c| c == column),
            (IncludeMode::ExcludeSpecified, None) => true,
            (IncludeMode::ExcludeSpecified, Some(filter)) => !filter.iter().any(|c| c == column),
        }
    }
}
