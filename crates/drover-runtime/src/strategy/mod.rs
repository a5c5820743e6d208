use crate::error::StrategyError;
use async_trait::async_trait;
use drover_core::retry::RetryPolicy;
use model::task::MigrationTask;

pub mod http;
pub mod internal;

/// The mechanism by which a task's execute/rollback are carried out.
/// Selected once per migration from its `ExecutionMode`; the processor
/// wraps `execute` in the strategy's retry policy and calls `rollback` at
/// most once, after the budget is exhausted.
#[async_trait]
pub trait TaskStrategy: Send + Sync {
    async fn execute(&self, task: &MigrationTask) -> Result<(), StrategyError>;

    async fn rollback(&self, task: &MigrationTask) -> Result<(), StrategyError>;

    fn retry_policy(&self) -> RetryPolicy;
}
