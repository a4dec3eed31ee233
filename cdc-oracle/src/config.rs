use cdc_config::{DatabaseSpec, TableRule};

/// Connection + LogMiner settings derived from the aggregate for one
/// Oracle source (spec §4.4). Oracle CDC here means polling
/// `V$LOGMNR_CONTENTS` after starting a LogMiner session over the
/// archived (and, if configured, online) redo logs; there is no
/// push-based streaming primitive to tail.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub host: String,
    pub port: u16,
    pub service_name: String,
    pub username: String,
    pub password: String,
    pub schema: String,
    pub watched_tables: Vec<String>,
}

impl OracleConfig {
    pub fn from_aggregate(database: &DatabaseSpec, tables: &[TableRule]) -> Self {
        let watched_tables = tables.iter().map(|rule| rule.table_identifier(&database.database).table.to_uppercase()).collect();

        OracleConfig {
            host: database.host.clone(),
            port: database.port,
            service_name: database.database.clone(),
            username: database.username.clone(),
            password: database.password.clone(),
            schema: database.username.to_uppercase(),
            watched_tables,
        }
    }

    pub fn connect_string(&self) -> String {
        format!("//{}:{}/{}", self.host, self.port, self.service_name)
    }
}
