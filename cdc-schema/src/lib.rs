mod tracker;

pub use tracker::{SchemaChange, SchemaChangeKind, SchemaTracker, TableSchema};
