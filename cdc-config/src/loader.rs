use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::aggregate::ConfigurationAggregate;
use crate::broker::BrokerSpec;
use crate::database::DatabaseSpec;
use crate::error::ConfigError;
use crate::table::TableRule;

#[derive(serde::Deserialize)]
struct RawDocument {
    database: DatabaseSpec,
    tables: Vec<TableRule>,
    kafka: BrokerSpec,
}

/// Loads and validates the YAML document at `path`, resolving `${VAR}`
/// environment references first (spec §4.1/§6).
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigLoader { path: path.into() }
    }

    pub fn load(&self) -> Result<ConfigurationAggregate, ConfigError> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|source| ConfigError::Io { path: self.path.display().to_string(), source })?;

        let resolved = resolve_env_vars(&raw);

        let doc: RawDocument = serde_yaml::from_str(&resolved)
            .map_err(|source| ConfigError::Parse { path: self.path.display().to_string(), source })?;

        ConfigurationAggregate::new(doc.database, doc.tables, doc.kafka)
    }

    pub fn last_modified(&self) -> Result<SystemTime, ConfigError> {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|source| ConfigError::Io { path: self.path.display().to_string(), source })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replaces every `${VAR}` occurrence with the matching environment
/// variable; an unresolved reference becomes the empty string and logs a
/// warning (spec §6), it is never treated as a parse error.
fn resolve_env_vars(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let env: HashMap<String, String> = std::env::vars().collect();

    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = input[i + 2..].find('}') {
                let var_name = &input[i + 2..i + 2 + end];
                match env.get(var_name) {
                    Some(value) => output.push_str(value),
                    None => warn!(var = var_name, "unresolved ${{VAR}} reference in config; substituting empty string"),
                }
                i += 2 + end + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        output.push(ch);
        i += ch.len_utf8();
    }
    output
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolves_known_env_var() {
        std::env::set_var("CDC_CONFIG_TEST_VAR", "hunter2");
        let resolved = resolve_env_vars("password: ${CDC_CONFIG_TEST_VAR}");
        assert_eq!(resolved, "password: hunter2");
        std::env::remove_var("CDC_CONFIG_TEST_VAR");
    }

    #[test]
    fn unresolved_var_becomes_empty_string() {
        std::env::remove_var("CDC_CONFIG_DEFINITELY_UNSET");
        let resolved = resolve_env_vars("password: ${CDC_CONFIG_DEFINITELY_UNSET}");
        assert_eq!(resolved, "password: ");
    }

    #[test]
    fn leaves_text_without_var_references_untouched() {
        let resolved = resolve_env_vars("host: localhost");
        assert_eq!(resolved, "host: localhost");
    }
}
