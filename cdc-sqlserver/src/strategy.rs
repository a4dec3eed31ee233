use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use cdc_common::{CResult, OperationType, Position, RawChange, ReError, SourceStrategy, TableIdentifier};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::{CaptureInstance, SqlServerConfig};
use crate::decode::{column_value, CdcOperation};

/// One pending update whose before-image has been seen but whose
/// after-image hasn't arrived yet, keyed by `__$seqval` (spec §4.4: SQL
/// Server reports an UPDATE as two rows sharing that column).
struct PendingUpdate {
    before: HashMap<String, (cdc_common::ColumnTypeHint, cdc_common::SourceValue)>,
    lsn: Vec<u8>,
}

/// Polls `cdc.fn_cdc_get_all_changes_<capture_instance>` for each
/// configured capture instance in turn. SQL Server CDC has no push
/// notification; the strategy advances its own high-water mark
/// (`__$start_lsn`) per instance and re-queries from there.
pub struct SqlServerStrategy {
    config: SqlServerConfig,
    client: Option<Client<Compat<TcpStream>>>,
    source_partition: String,
    cursor: HashMap<String, Vec<u8>>,
    pending_updates: HashMap<(String, Vec<u8>), PendingUpdate>,
    queue: VecDeque<RawChange>,
    next_instance: usize,
    sequence: i64,
}

impl SqlServerStrategy {
    pub fn new(config: SqlServerConfig) -> Self {
        let source_partition = format!("sqlserver-{}-{}", config.host, config.database).to_lowercase();
        SqlServerStrategy {
            config,
            client: None,
            source_partition,
            cursor: HashMap::new(),
            pending_updates: HashMap::new(),
            queue: VecDeque::new(),
            next_instance: 0,
            sequence: 0,
        }
    }

    /// Every emitted event carries the cursor for *all* capture instances,
    /// not just the one it came from, so a resume picks up where every
    /// instance left off rather than re-scanning the others from scratch.
    fn offset_fields(&self) -> JsonMap<String, JsonValue> {
        let mut instances = JsonMap::new();
        for (instance, lsn) in &self.cursor {
            instances.insert(instance.clone(), JsonValue::String(hex::encode(lsn)));
        }
        let mut map = JsonMap::new();
        map.insert("captureInstances".to_string(), JsonValue::Object(instances));
        map
    }

    fn tiberius_config(&self) -> Config {
        let mut cfg = Config::new();
        cfg.host(&self.config.host);
        cfg.port(self.config.port);
        cfg.database(&self.config.database);
        cfg.authentication(AuthMethod::sql_server(&self.config.username, &self.config.password));
        if self.config.trust_cert {
            cfg.trust_cert();
        }
        cfg
    }

    /// Queries one capture instance from its current LSN cursor and
    /// appends any rows found to the in-memory queue, pairing UPDATE
    /// before/after images as they arrive.
    async fn fetch_instance(&mut self, instance: &CaptureInstance) -> CResult<()> {
        let client = self.client.as_mut().ok_or_else(|| ReError::Bug("fetch called before connect".into()))?;

        let from_lsn_expr = match self.cursor.get(&instance.capture_instance) {
            Some(lsn) => format!("0x{}", hex::encode(lsn)),
            None => "sys.fn_cdc_get_min_lsn(N'{}')".replace("{}", &instance.capture_instance),
        };

        let query = format!(
            "DECLARE @from_lsn binary(10) = {from_lsn};
             DECLARE @to_lsn binary(10) = sys.fn_cdc_get_max_lsn();
             SELECT * FROM cdc.fn_cdc_get_all_changes_{instance}(@from_lsn, @to_lsn, N'all') ORDER BY __$start_lsn, __$seqval, __$operation;",
            from_lsn = from_lsn_expr,
            instance = instance.capture_instance,
        );

        let stream = client.simple_query(query).await.map_err(|e| ReError::DriverTransient(e.to_string()))?;
        let rows = stream.into_first_result().await.map_err(|e| ReError::DriverTransient(e.to_string()))?;

        let table_id = TableIdentifier::new(self.config.database.clone(), Some(instance.schema.clone()), instance.table.clone());

        for row in rows {
            let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();

            let op_index = columns.iter().position(|c| c == "__$operation").ok_or_else(|| ReError::DriverFatal("missing __$operation column".into()))?;
            let lsn_index = columns.iter().position(|c| c == "__$start_lsn").ok_or_else(|| ReError::DriverFatal("missing __$start_lsn column".into()))?;
            let seqval_index = columns.iter().position(|c| c == "__$seqval").ok_or_else(|| ReError::DriverFatal("missing __$seqval column".into()))?;

            let op_code = match row.try_get::<i32, _>(op_index) {
                Ok(Some(code)) => code,
                _ => return Err(ReError::DriverFatal("__$operation was not an integer".into())),
            };
            let operation = CdcOperation::from_code(op_code).ok_or_else(|| ReError::DriverFatal(format!("unknown CDC operation code {op_code}")))?;

            let lsn_bytes = match row.try_get::<&[u8], _>(lsn_index) {
                Ok(Some(bytes)) => bytes.to_vec(),
                _ => return Err(ReError::DriverFatal("__$start_lsn was not binary".into())),
            };
            let seqval_bytes = match row.try_get::<&[u8], _>(seqval_index) {
                Ok(Some(bytes)) => bytes.to_vec(),
                _ => return Err(ReError::DriverFatal("__$seqval was not binary".into())),
            };

            let mut fields = HashMap::new();
            for (idx, name) in columns.iter().enumerate() {
                if name.starts_with("__$") {
                    continue;
                }
                fields.insert(name.clone(), column_value(&row, idx));
            }

            self.sequence += 1;
            self.cursor.insert(instance.capture_instance.clone(), lsn_bytes.clone());
            let offset_fields = self.offset_fields();

            match operation {
                CdcOperation::Insert => {
                    self.queue.push_back(RawChange {
                        table: table_id.clone(),
                        operation: OperationType::Insert,
                        source_partition: self.source_partition.clone(),
                        offset_fields,
                        sequence: self.sequence,
                        before: None,
                        after: Some(fields),
                        snapshot: false,
                    });
                }
                CdcOperation::Delete => {
                    self.queue.push_back(RawChange {
                        table: table_id.clone(),
                        operation: OperationType::Delete,
                        source_partition: self.source_partition.clone(),
                        offset_fields,
                        sequence: self.sequence,
                        before: Some(fields),
                        after: None,
                        snapshot: false,
                    });
                }
                CdcOperation::UpdateBefore => {
                    self.pending_updates.insert(
                        (instance.capture_instance.clone(), seqval_bytes),
                        PendingUpdate { before: fields, lsn: lsn_bytes },
                    );
                }
                CdcOperation::UpdateAfter => {
                    let key = (instance.capture_instance.clone(), seqval_bytes);
                    let before = self.pending_updates.remove(&key).map(|p| p.before);
                    if before.is_none() {
                        tracing::warn!(capture_instance = %instance.capture_instance, "update after-image with no matching before-image, emitting as partial update");
                    }
                    self.queue.push_back(RawChange {
                        table: table_id.clone(),
                        operation: OperationType::Update,
                        source_partition: self.source_partition.clone(),
                        offset_fields,
                        sequence: self.sequence,
                        before,
                        after: Some(fields),
                        snapshot: false,
                    });
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SourceStrategy for SqlServerStrategy {
    async fn connect(&mut self, resume_from: Option<&Position>) -> CResult<()> {
        let config = self.tiberius_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| ReError::DriverTransient(e.to_string()))?;
        tcp.set_nodelay(true).map_err(|e| ReError::DriverTransient(e.to_string()))?;
        let client = Client::connect(config, tcp.compat_write()).await.map_err(|e| ReError::DriverTransient(e.to_string()))?;
        self.client = Some(client);

        if let Some(position) = resume_from {
            if position.source_partition == self.source_partition {
                if let Some(cursors) = position.offset.get("captureInstances").and_then(JsonValue::as_object) {
                    for (instance, lsn_hex) in cursors {
                        if let Some(hex_str) = lsn_hex.as_str() {
                            if let Ok(bytes) = hex::decode(hex_str) {
                                self.cursor.insert(instance.clone(), bytes);
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn poll(&mut self) -> CResult<Option<RawChange>> {
        if let Some(change) = self.queue.pop_front() {
            return Ok(Some(change));
        }

        if self.config.capture_instances.is_empty() {
            return Ok(None);
        }

        for _ in 0..self.config.capture_instances.len() {
            let instance = self.config.capture_instances[self.next_instance].clone();
            self.next_instance = (self.next_instance + 1) % self.config.capture_instances.len();
            self.fetch_instance(&instance).await?;
            if let Some(change) = self.queue.pop_front() {
                return Ok(Some(change));
            }
        }

        Ok(None)
    }

    async fn disconnect(&mut self) -> CResult<()> {
        self.client = None;
        Ok(())
    }

    fn source_partition(&self) -> &str {
        &self.source_partition
    }
}
