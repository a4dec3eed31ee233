use cdc_common::SourceStrategy;
use cdc_config::{ConfigurationAggregate, DatabaseType};
use cdc_mysql::{MySqlConfig, MySqlStrategy};
use cdc_oracle::{OracleConfig, OracleStrategy};
use cdc_postgres::{PostgresConfig, PostgresStrategy};
use cdc_sqlserver::{SqlServerConfig, SqlServerStrategy};

/// Builds the `SourceStrategy` matching one aggregate's database type
/// (spec §4.4). Each driver crate implements the trait on its own strategy
/// type; this is the one place that needs to know all four exist.
pub fn build_strategy(aggregate: &ConfigurationAggregate) -> Box<dyn SourceStrategy> {
    let database = &aggregate.database;
    let tables = &aggregate.tables;

    match database.db_type {
        DatabaseType::Postgresql => Box::new(PostgresStrategy::new(PostgresConfig::from_aggregate(database, tables))),
        DatabaseType::Mysql => {
            let server_id = derive_server_id(&database.partition_stem());
            Box::new(MySqlStrategy::new(MySqlConfig::from_aggregate(database, tables, server_id)))
        }
        DatabaseType::SqlServer => Box::new(SqlServerStrategy::new(SqlServerConfig::from_aggregate(database, tables))),
        DatabaseType::Oracle => Box::new(OracleStrategy::new(OracleConfig::from_aggregate(database, tables))),
    }
}

/// MySQL replication requires a `server_id` distinct from every other
/// replica attached to the primary. Deriving it from the partition stem
/// (FNV-1a, forced odd) means repeated runs against the same source reuse
/// the same id instead of colliding with a randomly chosen one.
fn derive_server_id(stem: &str) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for byte in stem.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash | 1
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn server_id_derivation_is_deterministic_and_nonzero() {
        let a = derive_server_id("mysql-host-cdcdb");
        let b = derive_server_id("mysql-host-cdcdb");
        assert_eq!(a, b);
        assert_ne!(a, 0);
        assert_eq!(a % 2, 1);
    }

    #[test]
    fn server_id_differs_across_sources() {
        assert_ne!(derive_server_id("mysql-host-a"), derive_server_id("mysql-host-b"));
    }
}
