use crate::{error::StoreError, store::QueueStore};
use serde::Serialize;
use std::{sync::Arc, time::Duration};

use model::migration::MigrationStatus;

/// ETA for the remaining tasks, derived from the last batch: the per-task
/// wall-clock average times the number of tasks still pending.
pub fn estimate_time_left(batch_elapsed: Duration, batch_size: usize, tasks_left: u64) -> Duration {
    if batch_size == 0 {
        return Duration::ZERO;
    }
    let per_task_ms = batch_elapsed.as_millis() as u64 / batch_size as u64;
    Duration::from_millis(per_task_ms.saturating_mul(tasks_left))
}

/// Point-in-time view of a migration run, consumed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub migration: String,
    pub status: MigrationStatus,
    pub total_tasks: u64,
    pub tasks_left: u64,
    pub time_left_ms: Option<u64>,
}

#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn QueueStore>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        ProgressService { store }
    }

    pub async fn report(&self, migration_name: &str) -> Result<ProgressReport, StoreError> {
        let migration = self
            .store
            .get_migration(migration_name)
            .await?
            .ok_or_else(|| StoreError::MigrationNotFound(migration_name.to_string()))?;

        let total_tasks = self.store.count_tasks(&migration.queue_name).await?;
        let tasks_left = self.store.count_pending(&migration.queue_name).await?;

        Ok(ProgressReport {
            migration: migration.name,
            status: migration.status,
            total_tasks,
            tasks_left,
            time_left_ms: migration.time_left_ms,
        })
    }
}
