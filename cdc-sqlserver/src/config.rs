use cdc_config::{DatabaseSpec, TableRule};

/// Connection + capture settings derived from the aggregate for one SQL
/// Server source (spec §4.4). SQL Server CDC is change-table based, not a
/// continuous log stream, so the strategy polls
/// `cdc.fn_cdc_get_all_changes_<capture_instance>` rather than tailing a
/// socket.
#[derive(Debug, Clone)]
pub struct SqlServerConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub trust_cert: bool,
    pub capture_instances: Vec<CaptureInstance>,
}

#[derive(Debug, Clone)]
pub struct CaptureInstance {
    pub schema: String,
    pub table: String,
    pub capture_instance: String,
    pub composite_key: Option<Vec<String>>,
}

impl SqlServerConfig {
    pub fn from_aggregate(database: &DatabaseSpec, tables: &[TableRule]) -> Self {
        let capture_instances = tables
            .iter()
            .map(|rule| {
                let id = rule.table_identifier(&database.database);
                let schema = id.schema.clone().unwrap_or_else(|| "dbo".to_string());
                CaptureInstance {
                    capture_instance: format!("{}_{}", schema, id.table),
                    schema,
                    table: id.table,
                    composite_key: rule.composite_key.as_ref().map(|k| k.column_names.clone()),
                }
            })
            .collect();

        SqlServerConfig {
            host: database.host.clone(),
            port: database.port,
            database: database.database.clone(),
            username: database.username.clone(),
            password: database.password.clone(),
            trust_cert: database.ssl.as_ref().map(|ssl| !ssl.enabled).unwrap_or(true),
            capture_instances,
        }
    }
}
