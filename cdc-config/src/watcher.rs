use std::collections::HashSet;
use std::time::Duration;

use cdc_common::TableIdentifier;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::aggregate::ConfigurationAggregate;
use crate::loader::ConfigLoader;

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Emitted when a reload produces a structurally different aggregate (spec
/// §4.1). `added`/`removed` are computed by `TableIdentifier` set difference.
#[derive(Debug, Clone)]
pub struct ConfigChanged {
    pub old_aggregate: ConfigurationAggregate,
    pub new_aggregate: ConfigurationAggregate,
    pub added: HashSet<TableIdentifier>,
    pub removed: HashSet<TableIdentifier>,
}

/// Periodically reloads the configuration file and diffs it against the
/// currently active aggregate. A failed reload is logged and never
/// replaces the active configuration (spec §4.1 failure semantics).
pub struct ConfigWatcher {
    loader: ConfigLoader,
    current: RwLock<ConfigurationAggregate>,
    interval: Duration,
}

impl ConfigWatcher {
    pub fn new(loader: ConfigLoader, initial: ConfigurationAggregate) -> Self {
        ConfigWatcher { loader, current: RwLock::new(initial), interval: DEFAULT_WATCH_INTERVAL }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn current(&self) -> ConfigurationAggregate {
        self.current.read().await.clone()
    }

    /// Runs until `shutdown` resolves. Intended to be spawned as the
    /// `config-watcher` task (spec §5).
    pub async fn watch(&self, sink: UnboundedSender<ConfigChanged>, mut shutdown: tokio::sync::oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick(&sink).await {
                        error!(error = %err, "config watcher tick failed");
                    }
                }
                _ = &mut shutdown => {
                    info!("config watcher shutting down");
                    return;
                }
            }
        }
    }

    async fn tick(&self, sink: &UnboundedSender<ConfigChanged>) -> Result<(), crate::error::ConfigError> {
        let reloaded = self.loader.load()?;
        let mut current = self.current.write().await;

        if current.structurally_equals(&reloaded) {
            return Ok(());
        }

        let old_tables = current.table_identifiers();
        let new_tables = reloaded.table_identifiers();
        let added = new_tables.difference(&old_tables).cloned().collect();
        let removed = old_tables.difference(&new_tables).cloned().collect();

        let changed = ConfigChanged { old_aggregate: current.clone(), new_aggregate: reloaded.clone(), added, removed };
        *current = reloaded;
        drop(current);

        if sink.send(changed).is_err() {
            error!("config watcher sink dropped; no receiver to deliver ConfigChanged");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use crate::broker::BrokerSpec;
    use crate::database::{DatabaseSpec, DatabaseType};
    use crate::table::{IncludeMode, TableRule};

    use super::*;

    fn aggregate(table_names: &[&str]) -> ConfigurationAggregate {
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
        let tables = table_names
            .iter()
            .map(|name| TableRule { name: name.to_string(), include_mode: IncludeMode::IncludeAll, column_filter: None, composite_key: None })
            .collect();
        let kafka = BrokerSpec {
            brokers: vec!["localhost:9092".to_string()],
            topic_pattern: "cdc.{database}.{table}".to_string(),
            security: None,
            producer_properties: HashMap::new(),
        };
        ConfigurationAggregate::new(database, tables, kafka).unwrap()
    }

    #[tokio::test]
    async fn tick_detects_added_and_removed_tables() {
        let dir = std::env::temp_dir().join(format!("cdc-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");

        std::fs::write(
            &path,
            r#"
database: {type: POSTGRESQL, host: db.internal, port: 5432, database: cdcdb, username: repl, password: secret}
tables: [{name: "customers"}]
kafka: {brokers: ["localhost:9092"], topicPattern: "cdc.{database}.{table}"}
"#,
        )
        .unwrap();

        let loader = ConfigLoader::new(&path);
        let watcher = ConfigWatcher::new(loader, aggregate(&["orders"]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        watcher.tick(&tx).await.unwrap();
        let changed = rx.recv().await.unwrap();

        assert!(changed.added.iter().any(|id| id.table == "customers"));
        assert!(changed.removed.iter().any(|id| id.table == "orders"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
