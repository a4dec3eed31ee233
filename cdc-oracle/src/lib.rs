mod config;
mod sql_redo;
mod strategy;

pub use config::OracleConfig;
pub use strategy::OracleStrategy;
