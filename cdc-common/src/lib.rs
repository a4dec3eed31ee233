pub mod err;
pub mod iso8601;
pub mod log;
pub mod metrics;
pub mod model;
pub mod strategy;

pub use err::{CResult, ReError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use model::{
    ChangeEvent, ColumnTypeHint, EventMetadata, HealthCheck, HealthState, OperationType, Position, RawChange, RowData, SourceValue,
    TableIdentifier, Value, SCHEMA_VERSION,
};
pub use strategy::SourceStrategy;
