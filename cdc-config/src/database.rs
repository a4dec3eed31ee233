use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatabaseType {
    #[serde(rename = "POSTGRESQL")]
    Postgresql,
    #[serde(rename = "MYSQL")]
    Mysql,
    #[serde(rename = "SQLSERVER")]
    SqlServer,
    #[serde(rename = "ORACLE")]
    Oracle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SslMode {
    #[serde(rename = "REQUIRE")]
    Require,
    #[serde(rename = "VERIFY_CA")]
    VerifyCa,
    #[serde(rename = "VERIFY_FULL")]
    VerifyFull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SslSpec {
    pub enabled: bool,
    #[serde(default = "default_ssl_mode")]
    pub mode: SslMode,
    #[serde(default, rename = "caCertPath", skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<String>,
    #[serde(default, rename = "clientCertPath", skip_serializing_if = "Option::is_none")]
    pub client_cert_path: Option<String>,
    #[serde(default, rename = "clientKeyPath", skip_serializing_if = "Option::is_none")]
    pub client_key_path: Option<String>,
}

fn default_ssl_mode() -> SslMode {
    SslMode::Require
}

/// The `database:` block of the YAML document (spec §6). Credentials may
/// contain `${VAR}` references; resolution happens in the loader before
/// validation, so by the time a `DatabaseSpec` exists, `password` is plain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<SslSpec>,
    #[serde(default, rename = "additionalProperties", skip_serializing_if = "HashMap::is_empty")]
    pub additional_properties: HashMap<String, String>,
}

impl DatabaseSpec {
    /// The identifier used for `Position.sourcePartition` elsewhere in the
    /// pipeline: `"{type}-{host}-{database}"`, lowercased.
    pub fn partition_stem(&self) -> String {
        let type_name = match self.db_type {
            DatabaseType::Postgresql => "postgres",
            DatabaseType::Mysql => "mysql",
            DatabaseType::SqlServer => "sqlserver",
            DatabaseType::Oracle => "oracle",
        };
        format!("{}-{}-{}", type_name, self.host, self.database).to_lowercase()
    }

    /// Existing asset paths required when TLS is configured (spec §3's
    /// "if TLS asset paths are provided, files must exist").
    pub fn tls_asset_paths(&self) -> Vec<&str> {
        let Some(ssl) = &self.ssl else { return vec![] };
        [ssl.ca_cert_path.as_deref(), ssl.client_cert_path.as_deref(), ssl.client_key_path.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partition_stem_is_lowercase_and_stable() {
        let spec = DatabaseSpec {
            db_type: DatabaseType::Postgresql,
            host: "PG-Host".to_string(),
            port: 5432,
            database: "CdcDB".to_string(),
            username: "repl".to_string(),
            password: "secret".to_string(),
            ssl: None,
            additional_properties: HashMap::new(),
        };
        assert_eq!(spec.partition_stem(), "postgres-pg-host-cdcdb");
    }

    #[test]
    fn tls_asset_paths_collects_only_provided_paths() {
        let spec = DatabaseSpec {
            db_type: DatabaseType::Mysql,
            host: "h".to_string(),
            port: 3306,
            database: "d".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
            ssl: Some(SslSpec {
                enabled: true,
                mode: SslMode::VerifyFull,
                ca_cert_path: Some("/tmp/ca.pem".to_string()),
                client_cert_path: None,
                client_key_path: None,
            }),
            additional_properties: HashMap::new(),
        };
        assert_eq!(spec.tls_asset_paths(), vec!["/tmp/ca.pem"]);
    }
}
