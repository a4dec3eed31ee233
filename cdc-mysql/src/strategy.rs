use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use cdc_common::{CResult, OperationType, Position, RawChange, ReError, SourceStrategy, TableIdentifier};
use futures_util::TryStreamExt;
use mysql_async::binlog::events::{EventData, RowsEventData, TableMapEvent};
use mysql_async::prelude::*;
use mysql_async::{BinlogRequest, BinlogStream, Conn, Opts, OptsBuilder, Pool};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::config::MySqlConfig;
use crate::decode::column_value;

struct TableMeta {
    database: String,
    table: String,
    columns: Vec<String>,
}

/// Tails the MySQL binlog as a replica (spec §4.4). The binlog's
/// `TableMapEvent` carries column *types* but not names, so column names
/// are resolved once per table via `information_schema.columns` and
/// cached by the binlog's numeric table id.
pub struct MySqlStrategy {
    config: MySqlConfig,
    pool: Option<Pool>,
    stream: Option<BinlogStream>,
    table_cache: HashMap<u64, TableMeta>,
    source_partition: String,
    sequence: i64,
    queue: VecDeque<RawChange>,
    current_filename: Vec<u8>,
    current_pos: u64,
}

impl MySqlStrategy {
    pub fn new(config: MySqlConfig) -> Self {
        let source_partition = format!("mysql-{}-{}", config.host, config.database).to_lowercase();
        MySqlStrategy {
            config,
            pool: None,
            stream: None,
            table_cache: HashMap::new(),
            source_partition,
            sequence: 0,
            queue: VecDeque::new(),
            current_filename: Vec::new(),
            current_pos: 4,
        }
    }

    fn opts(&self) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(self.config.host.clone())
            .tcp_port(self.config.port)
            .db_name(Some(self.config.database.clone()))
            .user(Some(self.config.username.clone()))
            .pass(Some(self.config.password.clone()))
            .into()
    }

    async fn table_meta(&mut self, conn: &mut Conn, event: &TableMapEvent<'_>) -> CResult<()> {
        let table_id = event.table_id();
        if self.table_cache.contains_key(&table_id) {
            return Ok(());
        }

        let database = event.database_name().to_string();
        let table = event.table_name().to_string();

        let columns: Vec<String> = conn
            .exec(
                "SELECT column_name FROM information_schema.columns WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
                (database.clone(), table.clone()),
            )
            .await
            .map_err(|e| ReError::DriverTransient(e.to_string()))?;

        self.table_cache.insert(table_id, TableMeta { database, table, columns });
        Ok(())
    }

    fn should_watch(&self, table: &str) -> bool {
        self.config.watched_tables.is_empty() || self.config.watched_tables.iter().any(|t| t == table)
    }

    fn build_row(&self, table_id: u64, values: Vec<mysql_async::Value>) -> Option<HashMap<String, (cdc_common::ColumnTypeHint, cdc_common::SourceValue)>> {
        let meta = self.table_cache.get(&table_id)?;
        let mut fields = HashMap::new();
        for (name, value) in meta.columns.iter().zip(values.iter()) {
            fields.insert(name.clone(), column_value(value));
        }
        Some(fields)
    }

    fn offset_fields(&self) -> JsonMap<String, JsonValue> {
        let mut map = JsonMap::new();
        map.insert("file".to_string(), JsonValue::String(String::from_utf8_lossy(&self.current_filename).to_string()));
        map.insert("pos".to_string(), JsonValue::from(self.current_pos));
        map
    }
}

#[async_trait]
impl SourceStrategy for MySqlStrategy {
    async fn connect(&mut self, resume_from: Option<&Position>) -> CResult<()> {
        let pool = Pool::new(self.opts());
        let mut conn = pool.get_conn().await.map_err(|e| ReError::DriverTransient(e.to_string()))?;

        let mut request = BinlogRequest::new(self.config.server_id);

        if let Some(position) = resume_from {
            if position.source_partition == self.source_partition {
                if let (Some(file), Some(pos)) = (position.offset.get("file").and_then(JsonValue::as_str), position.offset.get("pos").and_then(JsonValue::as_u64)) {
                    self.current_filename = file.as_bytes().to_vec();
                    self.current_pos = pos;
                    request = request.with_filename(file.as_bytes().to_vec()).with_pos(pos);
                }
            }
        }

        let stream = conn.get_binlog_stream(request).await.map_err(|e| ReError::DriverFatal(e.to_string()))?;

        self.pool = Some(pool);
        self.stream = Some(stream);
        Ok(())
    }

    async fn poll(&mut self) -> CResult<Option<RawChange>> {
        if let Some(change) = self.queue.pop_front() {
            return Ok(Some(change));
        }

        loop {
            let stream = self.stream.as_mut().ok_or_else(|| ReError::Bug("poll called before connect".into()))?;
            let event = match stream.try_next().await.map_err(|e| ReError::DriverTransient(e.to_string()))? {
                Some(event) => event,
                None => return Ok(None),
            };

            self.current_pos = event.header().log_pos() as u64;

            let data = match event.read_data().map_err(|e| ReError::DriverFatal(e.to_string()))? {
                Some(data) => data,
                None => continue,
            };

            match data {
                EventData::RotateEvent(rotate) => {
                    self.current_filename = rotate.name_raw().to_vec();
                    self.current_pos = rotate.position();
                }
                EventData::TableMapEvent(table_map) => {
                    let pool = self.pool.clone().ok_or_else(|| ReError::Bug("no pool".into()))?;
                    let mut conn = pool.get_conn().await.map_err(|e| ReError::DriverTransient(e.to_string()))?;
                    self.table_meta(&mut conn, &table_map).await?;
                }
                EventData::RowsEvent(rows_event) => {
                    self.handle_rows_event(rows_event)?;
                    if let Some(change) = self.queue.pop_front() {
                        return Ok(Some(change));
                    }
                }
                _ => {}
            }
        }
    }

    async fn disconnect(&mut self) -> CResult<()> {
        self.stream = None;
        self.pool = None;
        Ok(())
    }

    fn source_partition(&self) -> &str {
        &self.source_partition
    }
}

impl MySqlStrategy {
    fn handle_rows_event(&mut self, data: RowsEventData<'_>) -> CResult<()> {
        let (table_id, operation, rows): (u64, OperationType, Vec<(Option<Vec<mysql_async::Value>>, Option<Vec<mysql_async::Value>>)>) = match data {
            RowsEventData::WriteRowsEvent(write) => {
                let rows = write.rows_raw().map(|row| (None, Some(row))).collect();
                (write.table_id(), OperationType::Insert, rows)
            }
            RowsEventData::DeleteRowsEvent(delete) => {
                let rows = delete.rows_raw().map(|row| (Some(row), None)).collect();
                (delete.table_id(), OperationType::Delete, rows)
            }
            RowsEventData::UpdateRowsEvent(update) => {
                let rows = update.rows_raw().map(|(before, after)| (Some(before), Some(after))).collect();
                (update.table_id(), OperationType::Update, rows)
            }
            _ => return Ok(()),
        };

        let meta = match self.table_cache.get(&table_id) {
            Some(meta) => meta,
            None => {
                tracing::warn!(table_id, "rows event for table with no cached metadata, skipping");
                return Ok(());
            }
        };

        if !self.should_watch(&meta.table) {
            return Ok(());
        }

        let table = TableIdentifier::without_schema(meta.database.clone(), meta.table.clone());

        for (before_values, after_values) in rows {
            self.sequence += 1;
            self.queue.push_back(RawChange {
                table: table.clone(),
                operation,
                source_partition: self.source_partition.clone(),
                offset_fields: self.offset_fields(),
                sequence: self.sequence,
                before: before_values.and_then(|v| self.build_row(table_id, v)),
                after: after_values.and_then(|v| self.build_row(table_id, v)),
                snapshot: false,
            });
        }

        Ok(())
    }
}
