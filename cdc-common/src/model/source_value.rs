use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};

/// The driver-native value shape a `SourceStrategy` hands to the
/// normalizer, generalized from the teacher's internal column-value
/// enum (one variant per scalar class the supported drivers can produce,
/// rather than one per wire type).
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Boolean(bool),
    /// Any integer that fits in a 64-bit signed value.
    Integer(i64),
    /// An integer wider than 64 bits, already rendered as a base-10 string
    /// by the driver (e.g. an unsigned 64-bit MySQL column, or a numeric
    /// type with no fractional part and arbitrary precision).
    BigInteger(String),
    Decimal(BigDecimal),
    Float(f32),
    Double(f64),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Bytes(Vec<u8>),
    Text(String),
}

/// A hint about the column's declared type, used to decide whether an
/// integer column should be interpreted as epoch-milliseconds (spec
/// §4.3). `Unknown` falls back to the field-name heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTypeHint {
    Temporal,
    Numeric,
    Text,
    Binary,
    Unknown,
}
