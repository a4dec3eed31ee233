use bigdecimal::BigDecimal;
use cdc_common::{ColumnTypeHint, SourceValue};
use tiberius::{ColumnData, Row};

/// Converts one cell of a `cdc.fn_cdc_get_all_changes_*` row into the
/// normalizer's driver-agnostic shape. Unrepresentable or unexpected
/// column types fall back to their Rust `Debug` text rather than
/// panicking, consistent with the normalizer's own failure isolation
/// (spec §4.3): a single bad cell must never drop the whole row.
pub fn column_value(row: &Row, index: usize) -> (ColumnTypeHint, SourceValue) {
    let Some(data) = row.try_get::<ColumnData<'_>, _>(index).ok().flatten() else {
        return (ColumnTypeHint::Unknown, SourceValue::Null);
    };

    match data {
        ColumnData::Bit(Some(b)) => (ColumnTypeHint::Unknown, SourceValue::Boolean(b)),
        ColumnData::U8(Some(n)) => (ColumnTypeHint::Numeric, SourceValue::Integer(n as i64)),
        ColumnData::I16(Some(n)) => (ColumnTypeHint::Numeric, SourceValue::Integer(n as i64)),
        ColumnData::I32(Some(n)) => (ColumnTypeHint::Numeric, SourceValue::Integer(n as i64)),
        ColumnData::I64(Some(n)) => (ColumnTypeHint::Numeric, SourceValue::Integer(n)),
        ColumnData::F32(Some(f)) => (ColumnTypeHint::Numeric, SourceValue::Float(f)),
        ColumnData::F64(Some(f)) => (ColumnTypeHint::Numeric, SourceValue::Double(f)),
        ColumnData::Numeric(Some(n)) => {
            let decimal = BigDecimal::new(n.value().into(), n.scale() as i64);
            (ColumnTypeHint::Numeric, SourceValue::Decimal(decimal))
        }
        ColumnData::String(Some(s)) => (ColumnTypeHint::Text, SourceValue::Text(s.into_owned())),
        ColumnData::Binary(Some(bytes)) => (ColumnTypeHint::Binary, SourceValue::Bytes(bytes.into_owned())),
        ColumnData::DateTime2(Some(_)) | ColumnData::DateTime(Some(_)) | ColumnData::SmallDateTime(Some(_)) => {
            match row.try_get::<chrono::NaiveDateTime, _>(index) {
                Ok(Some(naive)) => (ColumnTypeHint::Temporal, SourceValue::Timestamp(naive.and_utc())),
                _ => (ColumnTypeHint::Temporal, SourceValue::Null),
            }
        }
        ColumnData::Date(Some(_)) => match row.try_get::<chrono::NaiveDate, _>(index) {
            Ok(Some(date)) => (ColumnTypeHint::Temporal, SourceValue::Date(date)),
            _ => (ColumnTypeHint::Temporal, SourceValue::Null),
        },
        _ => (ColumnTypeHint::Unknown, SourceValue::Null),
    }
}

/// `__$operation` codes from `cdc.fn_cdc_get_all_changes_*` (SQL Server's
/// own taxonomy, distinct from the generic `c|r|u|d` codes the other
/// drivers use): 1 = delete, 2 = insert, 3 = update (before image), 4 =
/// update (after image).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcOperation {
    Delete,
    Insert,
    UpdateBefore,
    UpdateAfter,
}

impl CdcOperation {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(CdcOperation::Delete),
            2 => Some(CdcOperation::Insert),
            3 => Some(CdcOperation::UpdateBefore),
            4 => Some(CdcOperation::UpdateAfter),
            _ => None,
        }
    }
}
