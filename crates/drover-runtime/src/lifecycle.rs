use crate::{error::ProcessError, processor::TaskProcessor};
use drover_core::store::QueueStore;
use model::{
    migration::{Migration, MigrationStatus},
    task::{MigrationTask, TaskStatus},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Front door for migration lifecycle operations: create, publish tasks,
/// run, stop. Thin over the store and the processor; holds no state of its
/// own.
pub struct MigrationService {
    store: Arc<dyn QueueStore>,
    processor: TaskProcessor,
}

impl MigrationService {
    pub fn new(store: Arc<dyn QueueStore>, processor: TaskProcessor) -> Self {
        MigrationService { store, processor }
    }

    /// Registers a migration. Caller-supplied status, timestamps, and ETA
    /// are discarded; a new record always starts Pending.
    pub async fn create_migration(&self, mut migration: Migration) -> Result<(), ProcessError> {
        migration.status = MigrationStatus::Pending;
        migration.time_left_ms = None;
        migration.created_at = chrono::Utc::now();

        self.store.insert_migration(&migration).await?;
        info!(migration = %migration.name, queue = %migration.queue_name, "migration created");
        Ok(())
    }

    /// Appends a task to a queue, forced back to Pending so a republished
    /// record is always eligible for the next run.
    pub async fn publish_task(
        &self,
        queue: &str,
        mut task: MigrationTask,
    ) -> Result<(), ProcessError> {
        task.status = TaskStatus::Pending;
        self.store.push_task(queue, &task).await?;
        Ok(())
    }

    /// Flags the migration Stopped. The flag is cooperative: a running
    /// processor observes it at its next batch boundary.
    pub async fn stop_migration(&self, name: &str) -> Result<(), ProcessError> {
        self.store
            .update_migration_status(name, MigrationStatus::Stopped)
            .await?;
        info!(migration = name, "stop requested");
        Ok(())
    }

    pub async fn process_tasks(
        &self,
        name: &str,
        cancel: CancellationToken,
    ) -> Result<(), ProcessError> {
        self.processor.process_tasks(name, cancel).await
    }
}
