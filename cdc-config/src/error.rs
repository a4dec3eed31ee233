use cdc_common::ReError;
use thiserror::Error;

/// Leaf error type for the config crate; collapsed into `ReError` at the
/// loader/watcher boundary so the rest of the pipeline only ever sees the
/// stable `ConfigInvalid`/`ConfigIO` taxonomy (spec §7).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("cannot parse config file {path}: {source}")]
    Parse { path: String, #[source] source: serde_yaml::Error },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ReError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io { path, source } => ReError::ConfigIO(format!("{path}: {source}")),
            ConfigError::Parse { path, source } => ReError::ConfigInvalid(format!("{path}: {source}")),
            ConfigError::Invalid(msg) => ReError::ConfigInvalid(msg),
        }
    }
}
