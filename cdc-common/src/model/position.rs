use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

const ORDER_KEY: &str = "__seq";

/// A replication position: a stable partition identifier plus an opaque,
/// driver-specific offset document (spec §3). Positions are totally
/// ordered *within* a partition by an embedded sequence number every
/// strategy is required to stamp into the offset document under `__seq`
/// (an LSN, a `(file, pos)` pair folded into one integer, an SCN, ...).
/// Positions from different partitions are not comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "sourcePartition")]
    pub source_partition: String,

    pub offset: JsonValue,
}

impl Position {
    /// `sequence` must be non-decreasing for a given `source_partition`;
    /// it becomes the ordering key returned by `order_key`.
    pub fn new(source_partition: impl Into<String>, mut offset_fields: Map<String, JsonValue>, sequence: i64) -> Self {
        offset_fields.insert(ORDER_KEY.to_string(), JsonValue::from(sequence));
        Position { source_partition: source_partition.into(), offset: JsonValue::Object(offset_fields) }
    }

    pub fn order_key(&self) -> i64 {
        self.offset.get(ORDER_KEY).and_then(JsonValue::as_i64).unwrap_or(0)
    }

    /// Ordering within `self.source_partition`. Callers must check
    /// `source_partition` equality themselves; positions of different
    /// partitions are not required to be comparable (spec §3).
    pub fn compare_within_partition(&self, other: &Position) -> Option<Ordering> {
        if self.source_partition != other.source_partition {
            return None;
        }
        Some(self.order_key().cmp(&other.order_key()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pos(partition: &str, seq: i64) -> Position {
        Position::new(partition, Map::new(), seq)
    }

    #[test]
    fn orders_within_same_partition() {
        let a = pos("mysql-host-db", 100);
        let b = pos("mysql-host-db", 200);
        assert_eq!(a.compare_within_partition(&b), Some(Ordering::Less));
    }

    #[test]
    fn different_partitions_are_incomparable() {
        let a = pos("mysql-host-db", 100);
        let b = pos("pg-host-db", 1);
        assert_eq!(a.compare_within_partition(&b), None);
    }

    #[test]
    fn round_trips_through_json() {
        let p = pos("mysql-host-db", 42);
        let json = serde_json::to_string(&p).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
