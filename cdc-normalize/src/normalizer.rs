use bigdecimal::{BigDecimal, ToPrimitive};
use cdc_common::{ColumnTypeHint, SourceValue, Value};
use chrono::{DateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Largest magnitude an integer may have and still round-trip exactly
/// through an IEEE-754 double (spec §4.3).
const MAX_SAFE_INTEGER: i64 = (1i64 << 53) - 1;

static TEMPORAL_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(_at$|_on$|^time|^date)").expect("static temporal field-name regex"));

fn looks_temporal(field_name: &str, declared_type: ColumnTypeHint) -> bool {
    declared_type == ColumnTypeHint::Temporal || (declared_type == ColumnTypeHint::Unknown && TEMPORAL_NAME_PATTERN.is_match(field_name))
}

/// Converts one driver-native value into the canonical `RowData` scalar
/// form (spec §4.3). Never fails: an unrepresentable or malformed value
/// falls back to its driver string form and logs a warning naming the
/// field, never the value.
pub fn normalize(field_name: &str, declared_type: ColumnTypeHint, value: SourceValue) -> Value {
    match value {
        SourceValue::Null => Value::Null,
        SourceValue::Boolean(b) => Value::Boolean(b),

        SourceValue::Integer(n) => {
            if looks_temporal(field_name, declared_type) {
                normalize_epoch_millis(field_name, n)
            } else {
                Value::Integer(n)
            }
        }

        SourceValue::BigInteger(digits) => normalize_big_integer(field_name, &digits),

        SourceValue::Decimal(decimal) => normalize_decimal(field_name, decimal),

        SourceValue::Float(f) => normalize_float(f as f64),
        SourceValue::Double(f) => normalize_float(f),

        SourceValue::Timestamp(ts) => Value::String(crate::iso8601(&ts)),

        SourceValue::Date(date) => {
            let midnight = date.and_time(NaiveTime::MIN);
            Value::String(crate::iso8601(&DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc)))
        }

        SourceValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),

        SourceValue::Text(s) => Value::String(s),
    }
}

fn normalize_epoch_millis(field_name: &str, millis: i64) -> Value {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(ts) => Value::String(crate::iso8601(&ts)),
        None => {
            warn!(field = field_name, "epoch-millis value out of range; falling back to string representation");
            Value::String(millis.to_string())
        }
    }
}

fn normalize_big_integer(field_name: &str, digits: &str) -> Value {
    match digits.parse::<i64>() {
        Ok(n) if n.checked_abs().is_some_and(|abs| abs <= MAX_SAFE_INTEGER) => Value::Integer(n),
        Ok(_) => Value::String(digits.to_string()),
        Err(_) => {
            // Wider than i64: still a valid arbitrary-precision integer,
            // just not one Rust's primitives hold. Preserve as-is.
            if digits.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | '+')) {
                Value::String(digits.to_string())
            } else {
                warn!(field = field_name, "unparseable big integer literal; falling back to string representation");
                Value::String(digits.to_string())
            }
        }
    }
}

fn normalize_decimal(_field_name: &str, decimal: BigDecimal) -> Value {
    if decimal.fractional_digit_count() <= 0 {
        match decimal.to_i64() {
            Some(n) if n.checked_abs().is_some_and(|abs| abs <= MAX_SAFE_INTEGER) => Value::Integer(n),
            _ => Value::String(decimal.to_plain_string()),
        }
    } else {
        let exactly_representable =
            decimal.to_f64().and_then(|f| BigDecimal::try_from(f).ok()).map(|round_tripped| round_tripped == decimal).unwrap_or(false);

        if exactly_representable {
            Value::Float(decimal.to_f64().expect("checked representable above"))
        } else {
            Value::String(decimal.to_plain_string())
        }
    }
}

fn normalize_float(f: f64) -> Value {
    if f.is_nan() {
        Value::String("NaN".to_string())
    } else if f.is_infinite() {
        Value::String(if f.is_sign_positive() { "Infinity".to_string() } else { "-Infinity".to_string() })
    } else {
        Value::Float(f)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn boolean_passes_through() {
        assert_eq!(normalize("active", ColumnTypeHint::Unknown, SourceValue::Boolean(true)), Value::Boolean(true));
    }

    #[test]
    fn small_integer_passes_through_when_not_temporal() {
        assert_eq!(normalize("quantity", ColumnTypeHint::Numeric, SourceValue::Integer(42)), Value::Integer(42));
    }

    #[test]
    fn integer_in_temporal_column_becomes_iso8601() {
        let value = normalize("created_at", ColumnTypeHint::Temporal, SourceValue::Integer(0));
        assert_eq!(value, Value::String("1970-01-01T00:00:00.000Z".to_string()));
    }

    #[test]
    fn integer_with_temporal_name_heuristic_becomes_iso8601() {
        let value = normalize("updated_at", ColumnTypeHint::Unknown, SourceValue::Integer(1_000));
        assert_eq!(value, Value::String("1970-01-01T00:00:01.000Z".to_string()));
    }

    #[test]
    fn big_integer_within_safe_range_becomes_integer() {
        assert_eq!(normalize("id", ColumnTypeHint::Numeric, SourceValue::BigInteger("12345".to_string())), Value::Integer(12345));
    }

    #[test]
    fn big_integer_outside_safe_range_becomes_string() {
        let huge = "99999999999999999999";
        assert_eq!(normalize("id", ColumnTypeHint::Numeric, SourceValue::BigInteger(huge.to_string())), Value::String(huge.to_string()));
    }

    #[test]
    fn integral_decimal_within_safe_range_becomes_integer() {
        let decimal = BigDecimal::from_str("100").unwrap();
        assert_eq!(normalize("total", ColumnTypeHint::Numeric, SourceValue::Decimal(decimal)), Value::Integer(100));
    }

    #[test]
    fn fractional_decimal_exactly_representable_becomes_float() {
        let decimal = BigDecimal::from_str("1.5").unwrap();
        assert_eq!(normalize("price", ColumnTypeHint::Numeric, SourceValue::Decimal(decimal)), Value::Float(1.5));
    }

    #[test]
    fn fractional_decimal_not_exactly_representable_becomes_string() {
        let decimal = BigDecimal::from_str("0.1234567890123456789").unwrap();
        let value = normalize("price", ColumnTypeHint::Numeric, SourceValue::Decimal(decimal.clone()));
        assert_eq!(value, Value::String(decimal.to_plain_string()));
    }

    #[test]
    fn nan_float_becomes_string() {
        assert_eq!(normalize("score", ColumnTypeHint::Numeric, SourceValue::Double(f64::NAN)), Value::String("NaN".to_string()));
    }

    #[test]
    fn infinite_float_becomes_signed_string() {
        assert_eq!(
            normalize("score", ColumnTypeHint::Numeric, SourceValue::Double(f64::NEG_INFINITY)),
            Value::String("-Infinity".to_string())
        );
    }

    #[test]
    fn finite_float_passes_through() {
        assert_eq!(normalize("score", ColumnTypeHint::Numeric, SourceValue::Double(3.25)), Value::Float(3.25));
    }

    #[test]
    fn date_becomes_start_of_day_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let value = normalize("birth_date", ColumnTypeHint::Temporal, SourceValue::Date(date));
        assert_eq!(value, Value::String("2024-03-05T00:00:00.000Z".to_string()));
    }

    #[test]
    fn invalid_utf8_bytes_are_replaced_with_replacement_character() {
        let bytes = vec![0xff, 0xfe, b'o', b'k'];
        let value = normalize("payload", ColumnTypeHint::Binary, SourceValue::Bytes(bytes));
        assert_eq!(value, Value::String("\u{FFFD}\u{FFFD}ok".to_string()));
    }

    #[test]
    fn null_passes_through() {
        assert_eq!(normalize("deleted_at", ColumnTypeHint::Temporal, SourceValue::Null), Value::Null);
    }
}
