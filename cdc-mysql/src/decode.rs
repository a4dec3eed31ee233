use bigdecimal::BigDecimal;
use cdc_common::{ColumnTypeHint, SourceValue};
use mysql_async::Value as MysqlValue;

/// Converts one decoded binlog cell into the normalizer's driver-agnostic
/// shape. The binlog carries no declared-type metadata beyond what
/// `mysql_async::Value`'s variant already encodes, so the hint is a best
/// guess from the variant alone; the normalizer's own heuristics (spec
/// §4.3) take it from there.
pub fn column_value(value: &MysqlValue) -> (ColumnTypeHint, SourceValue) {
    match value {
        MysqlValue::NULL => (ColumnTypeHint::Unknown, SourceValue::Null),
        MysqlValue::Int(n) => (ColumnTypeHint::Numeric, SourceValue::Integer(*n)),
        MysqlValue::UInt(n) => {
            if *n <= i64::MAX as u64 {
                (ColumnTypeHint::Numeric, SourceValue::Integer(*n as i64))
            } else {
                (ColumnTypeHint::Numeric, SourceValue::BigInteger(n.to_string()))
            }
        }
        MysqlValue::Float(f) => (ColumnTypeHint::Numeric, SourceValue::Float(*f)),
        MysqlValue::Double(f) => (ColumnTypeHint::Numeric, SourceValue::Double(*f)),
        MysqlValue::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => match text.parse::<BigDecimal>() {
                Ok(decimal) if text.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'.') => {
                    (ColumnTypeHint::Numeric, SourceValue::Decimal(decimal))
                }
                _ => (ColumnTypeHint::Text, SourceValue::Text(text.to_string())),
            },
            Err(_) => (ColumnTypeHint::Binary, SourceValue::Bytes(bytes.clone())),
        },
        MysqlValue::Date(year, month, day, hour, minute, second, micros) => {
            use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
            let date = NaiveDate::from_ymd_opt(*year as i32, *month as u32, (*day).max(1) as u32);
            let time = NaiveTime::from_hms_micro_opt(*hour as u32, *minute as u32, *second as u32, *micros);
            match (date, time) {
                (Some(d), Some(t)) => (ColumnTypeHint::Temporal, SourceValue::Timestamp(Utc.from_utc_datetime(&d.and_time(t)))),
                (Some(d), None) => (ColumnTypeHint::Temporal, SourceValue::Date(d)),
                _ => (ColumnTypeHint::Temporal, SourceValue::Null),
            }
        }
        MysqlValue::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_seconds = *days as i64 * 86_400 + *hours as i64 * 3_600 + *minutes as i64 * 60 + *seconds as i64;
            let signed = if *negative { -total_seconds } else { total_seconds };
            (ColumnTypeHint::Temporal, SourceValue::Text(format!("{signed}.{micros:06}")))
        }
    }
}
