use serde::{Deserialize, Serialize};

/// The canonical operation a `ChangeEvent` carries. Additional variants may
/// be appended over time; consumers on the wire are expected to ignore any
/// they don't recognize (`#[serde(other)]` below maps them to `Unknown`
/// rather than failing to deserialize).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(other, rename = "UNKNOWN")]
    Unknown,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "INSERT",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
            OperationType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn serializes_to_upper_snake() {
        assert_eq!(serde_json::to_string(&OperationType::Insert).unwrap(), "\"INSERT\"");
        assert_eq!(serde_json::to_string(&OperationType::Delete).unwrap(), "\"DELETE\"");
    }

    #[test]
    fn unknown_wire_values_deserialize_to_unknown_variant() {
        let v: OperationType = serde_json::from_str("\"TRUNCATE\"").unwrap();
        assert_eq!(v, OperationType::Unknown);
    }
}
