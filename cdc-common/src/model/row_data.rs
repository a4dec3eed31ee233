use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A normalized scalar value, as produced by the normalizer (spec §4.3).
/// This is the only shape a column value may take once it leaves the
/// driver-native representation behind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Boolean(b) => serializer.serialize_bool(*b),
        }
    }
}

/// An immutable mapping from column name to normalized scalar. Insertion
/// order is not significant (spec §3); equality and lookup are by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowData {
    columns: HashMap<String, Value>,
}

impl RowData {
    pub fn new(columns: HashMap<String, Value>) -> Self {
        RowData { columns }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    /// Builds the message key for this row (spec §4.5): the stringified
    /// values of `key_columns`, in the given stable order, joined with `|`.
    /// Empty when `key_columns` is empty.
    pub fn stable_key(&self, key_columns: &[String]) -> String {
        key_columns
            .iter()
            .map(|col| match self.columns.get(col) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Integer(i)) => i.to_string(),
                Some(Value::Float(f)) => f.to_string(),
                Some(Value::Boolean(b)) => b.to_string(),
                Some(Value::Null) | None => String::new(),
            })
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl Serialize for RowData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (k, v) in &self.columns {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stable_key_joins_in_requested_order() {
        let mut cols = HashMap::new();
        cols.insert("order_id".to_string(), Value::Integer(42));
        cols.insert("region".to_string(), Value::String("us".to_string()));
        let row = RowData::new(cols);

        assert_eq!(row.stable_key(&["region".to_string(), "order_id".to_string()]), "us|42");
    }

    #[test]
    fn stable_key_is_empty_for_no_key_columns() {
        let row = RowData::new(HashMap::new());
        assert_eq!(row.stable_key(&[]), "");
    }

    #[test]
    fn missing_column_serializes_as_empty_segment() {
        let row = RowData::new(HashMap::new());
        assert_eq!(row.stable_key(&["missing".to_string()]), "");
    }
}
