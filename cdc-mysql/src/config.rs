use cdc_config::{DatabaseSpec, TableRule};

/// Connection + replica-registration settings derived from the aggregate
/// for one MySQL source (spec §4.4). MySQL CDC tails the binlog as a
/// replica, so the strategy needs a `server_id` distinct from every other
/// replica (real or CDC) attached to the primary.
#[derive(Debug, Clone)]
pub struct MySqlConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub server_id: u32,
    pub watched_tables: Vec<String>,
}

impl MySqlConfig {
    pub fn from_aggregate(database: &DatabaseSpec, tables: &[TableRule], server_id: u32) -> Self {
        let watched_tables = tables.iter().map(|rule| rule.table_identifier(&database.database).table).collect();

        MySqlConfig {
            host: database.host.clone(),
            port: database.port,
            database: database.database.clone(),
            username: database.username.clone(),
            password: database.password.clone(),
            server_id,
            watched_tables,
        }
    }
}
