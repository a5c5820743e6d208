use crate::{error::StrategyError, strategy::TaskStrategy};
use async_trait::async_trait;
use drover_core::retry::RetryPolicy;
use model::task::MigrationTask;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

const MAX_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Capability injected by the embedding application to carry out tasks
/// in-process, e.g. moving a row from one store to another. Params are
/// opaque; the handler owns their shape.
#[async_trait]
pub trait InternalHandler: Send + Sync {
    async fn execute(&self, params: Option<&Value>) -> Result<(), StrategyError>;

    async fn rollback(&self, params: Option<&Value>) -> Result<(), StrategyError>;
}

/// Delegates execute/rollback to the injected handler, passing the task's
/// in-memory params through untouched.
pub struct InternalStrategy {
    handler: Arc<dyn InternalHandler>,
}

impl InternalStrategy {
    pub fn new(handler: Arc<dyn InternalHandler>) -> Self {
        InternalStrategy { handler }
    }
}

#[async_trait]
impl TaskStrategy for InternalStrategy {
    async fn execute(&self, task: &MigrationTask) -> Result<(), StrategyError> {
        self.handler.execute(task.params.as_ref()).await
    }

    async fn rollback(&self, task: &MigrationTask) -> Result<(), StrategyError> {
        self.handler.rollback(task.rollback_params.as_ref()).await
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::constant(MAX_ATTEMPTS, RETRY_DELAY)
    }
}
