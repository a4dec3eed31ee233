use cdc_config::{DatabaseSpec, TableRule};

/// Connection + logical-replication settings derived from the aggregate
/// for one PostgreSQL source (spec §4.4). A CDC deployment owns one
/// replication slot and one publication; both must already exist (or be
/// creatable with the configured role) before `connect` is called.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub slot_name: String,
    pub publication_name: String,
    pub watched_tables: Vec<String>,
}

impl PostgresConfig {
    pub fn from_aggregate(database: &DatabaseSpec, tables: &[TableRule]) -> Self {
        let watched_tables = tables.iter().map(|rule| rule.table_identifier(&database.database).table).collect();
        let stem = database.partition_stem();

        PostgresConfig {
            host: database.host.clone(),
            port: database.port,
            database: database.database.clone(),
            username: database.username.clone(),
            password: database.password.clone(),
            slot_name: format!("cdc_{}", stem.replace('-', "_")),
            publication_name: format!("cdc_{}", stem.replace('-', "_")),
            watched_tables,
        }
    }
}
