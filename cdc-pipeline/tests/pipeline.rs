use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cdc_common::{
    CResult, ChangeEvent, ColumnTypeHint, Metrics, OperationType, Position, RawChange, ReError, SourceStrategy, SourceValue, TableIdentifier,
    Value,
};
use cdc_config::{BrokerSpec, CompositeKey, ConfigurationAggregate, DatabaseSpec, DatabaseType, IncludeMode, TableRule};
use cdc_offsets::{FileOffsetStore, OffsetStore};
use cdc_pipeline::adapter::PipelineWorker;
use cdc_publish::Publisher;
use cdc_schema::SchemaTracker;
use serde_json::Map as JsonMap;

struct FakeStrategy {
    partition: String,
    queue: VecDeque<RawChange>,
    connected_with: Option<Position>,
}

impl FakeStrategy {
    fn new(partition: &str, records: Vec<RawChange>) -> Self {
        FakeStrategy { partition: partition.to_string(), queue: records.into(), connected_with: None }
    }

    fn connected_with(&self) -> Option<&Position> {
        self.connected_with.as_ref()
    }
}

#[async_trait]
impl SourceStrategy for FakeStrategy {
    async fn connect(&mut self, resume_from: Option<&Position>) -> CResult<()> {
        self.connected_with = resume_from.cloned();
        Ok(())
    }

    async fn poll(&mut self) -> CResult<Option<RawChange>> {
        Ok(self.queue.pop_front())
    }

    async fn disconnect(&mut self) -> CResult<()> {
        Ok(())
    }

    fn source_partition(&self) -> &str {
        &self.partition
    }
}

#[derive(Default)]
struct FakePublisher {
    published: Mutex<Vec<(ChangeEvent, Vec<String>)>>,
    fail_next: AtomicUsize,
    fail_with_serialization_error: AtomicUsize,
}

impl FakePublisher {
    fn failing(n: usize) -> Self {
        FakePublisher { published: Mutex::new(Vec::new()), fail_next: AtomicUsize::new(n), fail_with_serialization_error: AtomicUsize::new(0) }
    }

    fn failing_to_serialize(n: usize) -> Self {
        FakePublisher { published: Mutex::new(Vec::new()), fail_next: AtomicUsize::new(0), fail_with_serialization_error: AtomicUsize::new(n) }
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, event: &ChangeEvent, key_columns: &[String]) -> CResult<()> {
        if self.fail_with_serialization_error.load(Ordering::SeqCst) > 0 {
            self.fail_with_serialization_error.fetch_sub(1, Ordering::SeqCst);
            return Err(ReError::SerializationError("simulated malformed row".to_string()));
        }
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(ReError::BrokerUnavailable("simulated outage".to_string()));
        }
        self.published.lock().unwrap().push((event.clone(), key_columns.to_vec()));
        Ok(())
    }
}

fn table() -> TableIdentifier {
    TableIdentifier::without_schema("cdcdb", "orders")
}

fn aggregate() -> ConfigurationAggregate {
    let database = DatabaseSpec {
        db_type: DatabaseType::Postgresql,
        host: "db.internal".to_string(),
        port: 5432,
        database: "cdcdb".to_string(),
        username: "repl".to_string(),
        password: "secret".to_string(),
        ssl: None,
        additional_properties: HashMap::new(),
    };
    let tables = vec![TableRule {
        name: "orders".to_string(),
        include_mode: IncludeMode::IncludeAll,
        column_filter: None,
        composite_key: Some(CompositeKey { column_names: vec!["id".to_string()] }),
    }];
    let kafka = BrokerSpec {
        brokers: vec!["localhost:9092".to_string()],
        topic_pattern: "cdc.{database}.{table}".to_string(),
        security: None,
        producer_properties: HashMap::new(),
    };
    ConfigurationAggregate::new(database, tables, kafka).unwrap()
}

fn row(pairs: &[(&str, ColumnTypeHint, SourceValue)]) -> HashMap<String, (ColumnTypeHint, SourceValue)> {
    pairs.iter().map(|(name, hint, value)| (name.to_string(), (*hint, value.clone()))).collect()
}

fn raw(operation: OperationType, sequence: i64, before: Option<HashMap<String, (ColumnTypeHint, SourceValue)>>, after: Option<HashMap<String, (ColumnTypeHint, SourceValue)>>) -> RawChange {
    RawChange {
        table: table(),
        operation,
        source_partition: "postgres-db.internal-cdcdb".to_string(),
        offset_fields: JsonMap::new(),
        sequence,
        before,
        after,
        snapshot: false,
    }
}

async fn worker(strategy: FakeStrategy, publisher: Arc<FakePublisher>, offsets: Arc<FileOffsetStore>) -> PipelineWorker {
    let aggregate = aggregate();
    PipelineWorker::new(Box::new(strategy), &aggregate, Arc::new(SchemaTracker::new()), offsets, publisher, Arc::new(Metrics::new()))
}

fn temp_offset_store(name: &str) -> FileOffsetStore {
    let dir = std::env::temp_dir().join(format!("cdc-pipeline-test-{}-{}", name, std::process::id()));
    FileOffsetStore::new(dir)
}

#[tokio::test]
async fn insert_round_trips_to_publisher_and_offset_store() {
    let after = row(&[("id", ColumnTypeHint::Numeric, SourceValue::Integer(1)), ("status", ColumnTypeHint::Text, SourceValue::Text("OPEN".to_string()))]);
    let strategy = FakeStrategy::new("postgres-db.internal-cdcdb", vec![raw(OperationType::Insert, 1, None, Some(after))]);
    let publisher = Arc::new(FakePublisher::default());
    let offsets = Arc::new(temp_offset_store("insert"));
    offsets.ensure_dir().await.unwrap();

    let mut worker = worker(strategy, publisher.clone(), offsets.clone()).await;
    worker.connect().await.unwrap();

    let position = worker.tick().await.unwrap().expect("a record was processed");
    assert_eq!(position.source_partition, "postgres-db.internal-cdcdb");

    let published = publisher.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let (event, keys) = &published[0];
    assert_eq!(event.operation, OperationType::Insert);
    assert!(event.before.is_none());
    assert_eq!(event.after.as_ref().unwrap().get("status"), Some(&Value::String("OPEN".to_string())));
    assert_eq!(keys, &vec!["id".to_string()]);

    let stored = offsets.load("postgres-db.internal-cdcdb").await.unwrap();
    assert_eq!(stored.unwrap().order_key(), 1);
}

#[tokio::test]
async fn update_carries_before_and_after() {
    let before = row(&[("status", ColumnTypeHint::Text, SourceValue::Text("OPEN".to_string()))]);
    let after = row(&[("status", ColumnTypeHint::Text, SourceValue::Text("SHIPPED".to_string()))]);
    let strategy = FakeStrategy::new("postgres-db.internal-cdcdb", vec![raw(OperationType::Update, 5, Some(before), Some(after))]);
    let publisher = Arc::new(FakePublisher::default());
    let offsets = Arc::new(temp_offset_store("update"));
    offsets.ensure_dir().await.unwrap();

    let mut worker = worker(strategy, publisher.clone(), offsets).await;
    worker.connect().await.unwrap();
    worker.tick().await.unwrap();

    let published = publisher.published.lock().unwrap();
    let (event, _) = &published[0];
    assert_eq!(event.operation, OperationType::Update);
    assert_eq!(event.before.as_ref().unwrap().get("status"), Some(&Value::String("OPEN".to_string())));
    assert_eq!(event.after.as_ref().unwrap().get("status"), Some(&Value::String("SHIPPED".to_string())));
}

#[tokio::test]
async fn delete_carries_before_image_only() {
    let before = row(&[("id", ColumnTypeHint::Numeric, SourceValue::Integer(1))]);
    let strategy = FakeStrategy::new("postgres-db.internal-cdcdb", vec![raw(OperationType::Delete, 9, Some(before), None)]);
    let publisher = Arc::new(FakePublisher::default());
    let offsets = Arc::new(temp_offset_store("delete"));
    offsets.ensure_dir().await.unwrap();

    let mut worker = worker(strategy, publisher.clone(), offsets).await;
    worker.connect().await.unwrap();
    worker.tick().await.unwrap();

    let published = publisher.published.lock().unwrap();
    let (event, _) = &published[0];
    assert_eq!(event.operation, OperationType::Delete);
    assert!(event.after.is_none());
    assert!(event.before.is_some());
}

#[tokio::test]
async fn unrecognized_operation_is_dropped_without_blocking_the_stream() {
    let bad = raw(OperationType::Unknown, 1, None, None);
    let good_after = row(&[("id", ColumnTypeHint::Numeric, SourceValue::Integer(2))]);
    let good = raw(OperationType::Insert, 2, None, Some(good_after));

    let strategy = FakeStrategy::new("postgres-db.internal-cdcdb", vec![bad, good]);
    let publisher = Arc::new(FakePublisher::default());
    let offsets = Arc::new(temp_offset_store("bad-op"));
    offsets.ensure_dir().await.unwrap();

    let mut worker = worker(strategy, publisher.clone(), offsets).await;
    worker.connect().await.unwrap();

    let first = worker.tick().await.unwrap();
    assert!(first.is_some(), "a dropped record still advances the stream");
    assert!(publisher.published.lock().unwrap().is_empty());

    let second = worker.tick().await.unwrap();
    assert!(second.is_some());
    assert_eq!(publisher.published.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn untracked_table_is_discarded_and_offset_still_advances() {
    let other_table = TableIdentifier::without_schema("cdcdb", "not_configured");
    let record = RawChange {
        table: other_table,
        operation: OperationType::Insert,
        source_partition: "postgres-db.internal-cdcdb".to_string(),
        offset_fields: JsonMap::new(),
        sequence: 3,
        before: None,
        after: Some(row(&[("id", ColumnTypeHint::Numeric, SourceValue::Integer(1))])),
        snapshot: false,
    };

    let strategy = FakeStrategy::new("postgres-db.internal-cdcdb", vec![record]);
    let publisher = Arc::new(FakePublisher::default());
    let offsets = Arc::new(temp_offset_store("untracked"));
    offsets.ensure_dir().await.unwrap();

    let mut worker = worker(strategy, publisher.clone(), offsets.clone()).await;
    worker.connect().await.unwrap();

    let position = worker.tick().await.unwrap().expect("discarded records still consume a position");
    assert!(publisher.published.lock().unwrap().is_empty());
    assert_eq!(offsets.load(&position.source_partition).await.unwrap().unwrap().order_key(), 3);
}

#[tokio::test]
async fn publish_failure_leaves_offset_unadvanced_for_redelivery() {
    let after = row(&[("id", ColumnTypeHint::Numeric, SourceValue::Integer(1))]);
    let strategy = FakeStrategy::new("postgres-db.internal-cdcdb", vec![raw(OperationType::Insert, 7, None, Some(after))]);
    let publisher = Arc::new(FakePublisher::failing(1));
    let offsets = Arc::new(temp_offset_store("broker-outage"));
    offsets.ensure_dir().await.unwrap();

    let mut worker = worker(strategy, publisher.clone(), offsets.clone()).await;
    worker.connect().await.unwrap();

    let result = worker.tick().await;
    assert!(result.is_err());
    assert!(offsets.load("postgres-db.internal-cdcdb").await.unwrap().is_none(), "offset must not advance past a failed publish");
}

#[tokio::test]
async fn malformed_row_is_skipped_without_failing_the_tick() {
    let bad_after = row(&[("id", ColumnTypeHint::Numeric, SourceValue::Integer(1))]);
    let good_after = row(&[("id", ColumnTypeHint::Numeric, SourceValue::Integer(2))]);
    let strategy = FakeStrategy::new(
        "postgres-db.internal-cdcdb",
        vec![raw(OperationType::Insert, 11, None, Some(bad_after)), raw(OperationType::Insert, 12, None, Some(good_after))],
    );
    let publisher = Arc::new(FakePublisher::failing_to_serialize(1));
    let offsets = Arc::new(temp_offset_store("bad-serialization"));
    offsets.ensure_dir().await.unwrap();

    let mut worker = worker(strategy, publisher.clone(), offsets.clone()).await;
    worker.connect().await.unwrap();

    let first = worker.tick().await.unwrap();
    assert!(first.is_some(), "a skipped record still advances the stream");
    assert!(publisher.published.lock().unwrap().is_empty());
    assert!(offsets.load("postgres-db.internal-cdcdb").await.unwrap().is_none(), "offset must not advance past a skipped record");

    let second = worker.tick().await.unwrap();
    assert!(second.is_some());
    assert_eq!(publisher.published.lock().unwrap().len(), 1);
    assert_eq!(offsets.load("postgres-db.internal-cdcdb").await.unwrap().unwrap().order_key(), 12);
}

#[tokio::test]
async fn strategy_connect_is_handed_the_resume_position() {
    let mut strategy = FakeStrategy::new("postgres-db.internal-cdcdb", vec![]);
    let resume = Position::new("postgres-db.internal-cdcdb".to_string(), JsonMap::new(), 42);

    strategy.connect(Some(&resume)).await.unwrap();

    assert_eq!(strategy.connected_with().unwrap().order_key(), 42);
}
