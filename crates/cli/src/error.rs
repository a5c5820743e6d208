use drover_core::error::StoreError;
use drover_runtime::error::ProcessError;
use schema_lock::error::LockError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read the configuration file: {0}")]
    ConfigFileRead(#[from] std::io::Error),

    #[error("Failed to deserialize the configuration file as JSON: {0}")]
    ConfigDeserialize(#[from] serde_json::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to process migration tasks: {0}")]
    Process(#[from] ProcessError),

    #[error("Schema migration failed: {0}")]
    Lock(#[from] LockError),

    /// MySQL driver error.
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
