use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to connect to the database: {0}")]
    Connect(#[source] mysql_async::Error),

    #[error("Failed to begin the lock transaction: {0}")]
    Begin(#[source] mysql_async::Error),

    #[error("Failed to lock table '{table}': {source}")]
    Lock {
        table: String,
        #[source]
        source: mysql_async::Error,
    },

    #[error("Failed to unlock tables: {0}")]
    Unlock(#[source] mysql_async::Error),

    #[error("Failed to commit the lock transaction: {0}")]
    Commit(#[source] mysql_async::Error),

    #[error("No active transaction, nothing to unlock")]
    NoActiveTransaction,

    #[error("Schema script '{script}' failed: {source}")]
    Script {
        script: String,
        #[source]
        source: mysql_async::Error,
    },

    #[error("Failed to read schema scripts: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Invalid script path: {0}")]
    InvalidScriptPath(PathBuf),
}
