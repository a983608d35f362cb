use thiserror::Error;

/// Errors raised while building the run configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Batch size outside the supported presets.
    #[error("Invalid batch size {value}: expected one of {allowed:?}")]
    InvalidBatchSize { value: usize, allowed: &'static [usize] },

    /// Concurrency outside the supported presets.
    #[error("Invalid concurrency {value}: expected one of {allowed:?}")]
    InvalidConcurrency { value: usize, allowed: &'static [usize] },

    /// A required environment variable is not set.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    /// An environment variable holds a value that cannot be used.
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    /// The table mapping is unusable.
    #[error("Invalid table mapping: {0}")]
    Mapping(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
