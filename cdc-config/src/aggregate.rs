use std::collections::HashSet;
use std::path::Path;

use cdc_common::TableIdentifier;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::broker::BrokerSpec;
use crate::database::DatabaseSpec;
use crate::error::ConfigError;
use crate::table::TableRule;

fn broker_address_re() -> Regex {
    Regex::new(r"^[^:\s]+:\d{1,5}$").expect("static broker address regex")
}

fn sql_delimiter_re() -> Regex {
    Regex::new(r#"['"`;]"#).expect("static SQL delimiter regex")
}

/// The single root configuration object (spec §3). Constructed only
/// through `ConfigurationAggregate::new`, which runs every validation rule;
/// an invalid document never produces an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationAggregate {
    pub database: DatabaseSpec,
    pub tables: Vec<TableRule>,
    pub kafka: BrokerSpec,
    #[serde(skip, default = "Utc::now")]
    pub loaded_at: DateTime<Utc>,
}

impl ConfigurationAggregate {
    pub fn new(database: DatabaseSpec, tables: Vec<TableRule>, kafka: BrokerSpec) -> Result<Self, ConfigError> {
        let aggregate = ConfigurationAggregate { database, tables, kafka, loaded_at: Utc::now() };
        aggregate.validate()?;
        Ok(aggregate)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.is_empty() {
            return Err(ConfigError::Invalid("tables must be non-empty".to_string()));
        }

        let mut seen = HashSet::new();
        for rule in &self.tables {
            let id = rule.table_identifier(&self.database.database);
            if !seen.insert(id.clone()) {
                return Err(ConfigError::Invalid(format!("duplicate table {}", id)));
            }
        }

        if !self.kafka.topic_pattern.contains("{database}") || !self.kafka.topic_pattern.contains("{table}") {
            return Err(ConfigError::Invalid(
                "kafka.topicPattern must contain both {database} and {table}".to_string(),
            ));
        }

        if self.kafka.brokers.is_empty() {
            return Err(ConfigError::Invalid("kafka.brokers must be non-empty".to_string()));
        }
        let address_re = broker_address_re();
        for broker in &self.kafka.brokers {
            if !address_re.is_match(broker) {
                return Err(ConfigError::Invalid(format!("kafka broker address {} is not host:port", broker)));
            }
        }

        let delimiter_re = sql_delimiter_re();
        if delimiter_re.is_match(&self.database.host) || delimiter_re.is_match(&self.database.database) {
            return Err(ConfigError::Invalid("database host/name must not contain SQL delimiters".to_string()));
        }

        for path in self.database.tls_asset_paths() {
            if !Path::new(path).exists() {
                return Err(ConfigError::Invalid(format!("TLS asset {} does not exist", path)));
            }
        }

        Ok(())
    }

    pub fn table_identifiers(&self) -> HashSet<TableIdentifier> {
        self.tables.iter().map(|rule| rule.table_identifier(&self.database.database)).collect()
    }

    /// Structural equality ignoring `loaded_at`, used by the watcher's diff
    /// (spec §4.1).
    pub fn structurally_equals(&self, other: &ConfigurationAggregate) -> bool {
        self.database == other.database && self.tables == other.tables && self.kafka == other.kafka
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use crate::table::IncludeMode;

    use super::*;
    use crate::database::DatabaseType;

    fn database() -> DatabaseSpec {
        DatabaseSpec {
            db_type: DatabaseType::Postgresql,
            host: "db.internal".to_string(),
            port: 5432,
            database: "cdcdb".to_string(),
            username: "repl".to_string(),
            password: "secret".to_string(),
            ssl: None,
            additional_properties: HashMap::new(),
        }
    }

    fn tables() -> Vec<TableRule> {
        vec![TableRule { name: "orders".to_string(), include_mode: IncludeMode::IncludeAll, column_filter: None, composite_key: None }]
    }

    fn kafka() -> BrokerSpec {
        BrokerSpec {
            brokers: vec!["localhost:9092".to_string()],
            topic_pattern: "cdc.{database}.{table}".to_string(),
            security: None,
            producer_properties: HashMap::new(),
        }
    }

    #[test]
    fn valid_aggregate_constructs() {
        assert!(ConfigurationAggregate::new(database(), tables(), kafka()).is_ok());
    }

    #[test]
    fn rejects_duplicate_tables() {
        let dup = vec![tables()[0].clone(), tables()[0].clone()];
        assert!(ConfigurationAggregate::new(database(), dup, kafka()).is_err());
    }

    #[test]
    fn rejects_topic_pattern_missing_placeholder() {
        let mut bad_kafka = kafka();
        bad_kafka.topic_pattern = "cdc.{database}".to_string();
        assert!(ConfigurationAggregate::new(database(), tables(), bad_kafka).is_err());
    }

    #[test]
    fn rejects_empty_broker_list() {
        let mut bad_kafka = kafka();
        bad_kafka.brokers = vec![];
        assert!(ConfigurationAggregate::new(database(), tables(), bad_kafka).is_err());
    }

    #[test]
    fn rejects_malformed_broker_address() {
        let mut bad_kafka = kafka();
        bad_kafka.brokers = vec!["not-a-host-port".to_string()];
        assert!(ConfigurationAggregate::new(database(), tables(), bad_kafka).is_err());
    }

    #[test]
    fn rejects_sql_delimiter_in_host() {
        let mut bad_db = database();
        bad_db.host = "db'; DROP TABLE users;--".to_string();
        assert!(ConfigurationAggregate::new(bad_db, tables(), kafka()).is_err());
    }

    #[test]
    fn structural_equality_ignores_loaded_at() {
        let a = ConfigurationAggregate::new(database(), tables(), kafka()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = ConfigurationAggregate::new(database(), tables(), kafka()).unwrap();
        assert!(a.structurally_equals(&b));
        assert_ne!(a.loaded_at, b.loaded_at);
    }
}
