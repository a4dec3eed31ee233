mod normalizer;

pub use cdc_common::{ColumnTypeHint, SourceValue};
pub use normalizer::normalize;

use chrono::{DateTime, Utc};

/// Shared with `cdc_common::iso8601` so the normalizer's timestamp output
/// matches `ChangeEvent.timestamp`'s wire format exactly.
pub(crate) fn iso8601(ts: &DateTime<Utc>) -> String {
    cdc_common::iso8601::format(ts)
}
