use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one table in the source database. `schema` is absent for
/// engines without a schema concept (plain MySQL databases); present for
/// PostgreSQL/SQL Server/Oracle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableIdentifier {
    pub database: String,
    pub schema: Option<String>,
    pub table: String,
}

impl TableIdentifier {
    pub fn new(database: impl Into<String>, schema: Option<String>, table: impl Into<String>) -> Self {
        TableIdentifier { database: database.into(), schema, table: table.into() }
    }

    pub fn without_schema(database: impl Into<String>, table: impl Into<String>) -> Self {
        TableIdentifier::new(database, None, table)
    }

    /// `"database.schema.table"`, or `"database.table"` when `schema` is
    /// absent. Used as the routing-key stem for topic resolution.
    pub fn fully_qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}.{}", self.database, schema, self.table),
            None => format!("{}.{}", self.database, self.table),
        }
    }

    /// Parses `"schema.table"` or `"table"` as it appears in `TableRule`
    /// configuration, given the owning database name.
    pub fn parse_rule(database: impl Into<String>, rule_name: &str) -> Self {
        let database = database.into();
        match rule_name.split_once('.') {
            Some((schema, table)) => TableIdentifier::new(database, Some(schema.to_string()), table.to_string()),
            None => TableIdentifier::without_schema(database, rule_name.to_string()),
        }
    }
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fully_qualified())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fully_qualified_includes_schema_when_present() {
        let id = TableIdentifier::new("cdcdb", Some("public".to_string()), "orders");
        assert_eq!(id.fully_qualified(), "cdcdb.public.orders");
    }

    #[test]
    fn fully_qualified_omits_schema_when_absent() {
        let id = TableIdentifier::without_schema("cdcdb", "orders");
        assert_eq!(id.fully_qualified(), "cdcdb.orders");
    }

    #[test]
    fn parse_rule_splits_schema_and_table() {
        let id = TableIdentifier::parse_rule("cdcdb", "public.orders");
        assert_eq!(id.schema.as_deref(), Some("public"));
        assert_eq!(id.table, "orders");

        let id = TableIdentifier::parse_rule("cdcdb", "orders");
        assert_eq!(id.schema, None);
    }
}
