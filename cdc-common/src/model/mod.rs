mod change_event;
mod health;
mod operation_type;
mod position;
mod raw_change;
mod row_data;
mod source_value;
mod table_identifier;

pub use change_event::{ChangeEvent, EventMetadata, SCHEMA_VERSION};
pub use health::{HealthCheck, HealthState};
pub use operation_type::OperationType;
pub use position::Position;
pub use raw_change::RawChange;
pub use row_data::{RowData, Value};
pub use source_value::{ColumnTypeHint, SourceValue};
pub use table_identifier::TableIdentifier;
