use std::collections::HashMap;
use std::sync::Arc;

use cdc_common::{
    CResult, ChangeEvent, ColumnTypeHint, EventMetadata, Metrics, Position, ReError, RowData, SourceStrategy, SourceValue, TableIdentifier,
};
use cdc_config::{ConfigurationAggregate, DatabaseType, TableRule};
use cdc_offsets::OffsetStore;
use cdc_publish::Publisher;
use cdc_schema::{SchemaTracker, TableSchema};
use tracing::{debug, info, warn};

pub const CONNECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

type DecodedRow = HashMap<String, (ColumnTypeHint, SourceValue)>;

/// Driver-agnostic half of the source adapter (spec §4.4). Owns one
/// `SourceStrategy` and drives every record it decodes through schema
/// tracking, normalization, `ChangeEvent` construction, publishing, and
/// offset persistence. Nothing in here is specific to any one database.
pub struct PipelineWorker {
    strategy: Box<dyn SourceStrategy>,
    schema: Arc<SchemaTracker>,
    offsets: Arc<dyn OffsetStore>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<Metrics>,
    rules: HashMap<TableIdentifier, TableRule>,
    source_name: String,
    connector: String,
}

impl PipelineWorker {
    pub fn new(
        strategy: Box<dyn SourceStrategy>,
        aggregate: &ConfigurationAggregate,
        schema: Arc<SchemaTracker>,
        offsets: Arc<dyn OffsetStore>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let rules = aggregate
            .tables
            .iter()
            .map(|rule| (rule.table_identifier(&aggregate.database.database), rule.clone()))
            .collect();

        PipelineWorker {
            strategy,
            schema,
            offsets,
            publisher,
            metrics,
            rules,
            source_name: aggregate.database.partition_stem(),
            connector: connector_name(aggregate.database.db_type).to_string(),
        }
    }

    /// Connects the strategy, resuming from any offset already persisted
    /// for its partition (spec §4.2/§4.4).
    pub async fn connect(&mut self) -> CResult<()> {
        let resume_from = self.offsets.load(self.strategy.source_partition()).await?;
        self.strategy.connect(resume_from.as_ref()).await
    }

    pub async fn disconnect(&mut self) -> CResult<()> {
        self.strategy.disconnect().await
    }

    /// Pulls one decoded record from the strategy and drives it through the
    /// rest of the pipeline. Returns the record's position when something
    /// was consumed (whether published or discarded), `None` when the
    /// strategy had nothing ready this tick.
    pub async fn tick(&mut self) -> CResult<Option<Position>> {
        let Some(raw) = self.strategy.poll().await? else { return Ok(None) };
        self.metrics.record_captured();

        let table = raw.table.clone();
        let position = Position::new(raw.source_partition.clone(), raw.offset_fields.clone(), raw.sequence);

        let Some(rule) = self.rules.get(&table) else {
            debug!(table = %table, "record for untracked table, discarding");
            self.save_offset(&position).await;
            return Ok(Some(position));
        };

        let observed = observed_schema(raw.after.as_ref().or(raw.before.as_ref()));
        for change in self.schema.observe(&table, &observed) {
            self.metrics.record_schema_change();
            info!(table = %table, column = %change.column, kind = ?change.kind, "schema change observed");
        }

        let before = raw.before.map(|cols| normalize_row(cols, rule));
        let after = raw.after.map(|cols| normalize_row(cols, rule));

        let mut metadata = EventMetadata::new(self.source_name.clone(), CONNECTOR_VERSION, self.connector.clone());
        if raw.snapshot {
            metadata = metadata.snapshot();
        }

        let event = match ChangeEvent::new(table.clone(), raw.operation, chrono::Utc::now(), position.clone(), before, after, metadata) {
            Ok(event) => event,
            Err(err) => {
                self.metrics.record_failed();
                warn!(table = %table, error = %err, "dropping record that failed change-event construction");
                self.save_offset(&position).await;
                return Ok(Some(position));
            }
        };

        let key_columns = rule.composite_key.as_ref().map(|k| k.column_names.clone()).unwrap_or_default();

        if let Err(err) = self.publisher.publish(&event, &key_columns).await {
            self.metrics.record_failed();
            if matches!(err, ReError::SerializationError(_)) {
                warn!(table = %table, error = %err, "event failed to serialize, skipping; offset not advanced for this record");
                return Ok(Some(position));
            }
            warn!(table = %table, error = %err, "publish failed; offset not advanced, record will be redelivered");
            return Err(err);
        }

        self.save_offset(&position).await;
        Ok(Some(position))
    }

    async fn save_offset(&self, position: &Position) {
        if let Err(err) = self.offsets.save(position).await {
            warn!(partition = %position.source_partition, error = %err, "offset store save failed; driver keeps its in-memory cursor");
        }
    }
}

fn connector_name(db_type: DatabaseType) -> &'static str {
    match db_type {
        DatabaseType::Postgresql => "postgres",
        DatabaseType::Mysql => "mysql",
        DatabaseType::SqlServer => "sqlserver",
        DatabaseType::Oracle => "oracle",
    }
}

/// Builds the schema tracker's `{column: type}` view from whichever row
/// image is present. A declared type isn't available from `RawChange`
/// itself, so the column's `ColumnTypeHint` stands in for it.
fn observed_schema(row: Option<&DecodedRow>) -> TableSchema {
    let Some(row) = row else { return TableSchema::new() };
    row.iter().map(|(column, (hint, _))| (column.clone(), format!("{:?}", hint))).collect()
}

fn normalize_row(cols: DecodedRow, rule: &TableRule) -> RowData {
    let mut normalized = HashMap::new();
    for (column, (hint, value)) in cols {
        if !rule.includes_column(&column) {
            continue;
        }
        normalized.insert(column.clone(), cdc_normalize::normalize(&column, hint, value));
    }
    RowData::new(normalized)
}
