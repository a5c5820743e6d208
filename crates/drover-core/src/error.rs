use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode record: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Migration '{0}' already exists")]
    MigrationExists(String),

    #[error("Migration '{0}' not found")]
    MigrationNotFound(String),

    #[error("Task {id} not found in queue '{queue}'")]
    TaskNotFound { id: Uuid, queue: String },
}
