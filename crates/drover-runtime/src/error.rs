use drover_core::error::StoreError;
use thiserror::Error;

/// Errors surfaced by a task executor strategy. Inside the processor every
/// one of these is retryable; the retry budget is what makes them terminal.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Execute for task '{task}' returned status {status}")]
    HttpStatus { task: String, status: u16 },

    #[error("Invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("Handler error: {0}")]
    Handler(String),
}

/// Errors fatal to a `process_tasks` call. Individual task failures never
/// become a `ProcessError`; they stay confined to the task record.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Migration '{0}' not found")]
    MigrationNotFound(String),

    #[error("Migration '{0}' uses the internal mode but no handler is configured")]
    MissingHandler(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
