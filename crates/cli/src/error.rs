use connectors::sql::base::error::{ConnectorError, DbError};
use engine_config::error::SettingsError;
use engine_core::error::{RegistryError, StatsError};
use engine_runtime::error::LoadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Run registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to read run artifacts: {0}")]
    Artifacts(#[from] StatsError),

    #[error("Connection failed: {0}")]
    Connect(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
