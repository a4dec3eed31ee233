mod aggregate;
mod broker;
mod database;
mod error;
mod loader;
mod table;
mod watcher;

pub use aggregate::ConfigurationAggregate;
pub use broker::{BrokerSecurity, BrokerSpec, SaslMechanism, SecurityProtocol, Truststore};
pub use database::{DatabaseSpec, DatabaseType, SslMode, SslSpec};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use table::{CompositeKey, IncludeMode, TableRule};
pub use watcher::{ConfigChanged, ConfigWatcher, DEFAULT_WATCH_INTERVAL};
