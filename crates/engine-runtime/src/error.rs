use connectors::{
    error::{PoolError, SchemaError},
    file::error::FileError,
};
use engine_core::error::{RegistryError, StatsError};
use engine_processing::error::DispatchError;
use thiserror::Error;

/// Run-level failures. Any of these marks the run `failed`.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Run registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Run statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("Could not open the destination pool: {0}")]
    Pool(#[from] PoolError),

    #[error("Schema resolution failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("Input error: {0}")]
    Input(#[from] FileError),

    #[error("No input files found in {0}")]
    NoInputFiles(String),

    #[error("Batch dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}
