use crate::error::StoreError;
use async_trait::async_trait;
use model::{
    migration::{Migration, MigrationStatus},
    task::MigrationTask,
};

pub mod sled_store;

/// Durable store backing the migration records and the per-queue task
/// collections. The store is the source of truth and the synchronization
/// point between workers; they share no other mutable state.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Inserts a new migration record. Exactly one record may exist per
    /// name; a second insert fails with `MigrationExists`.
    async fn insert_migration(&self, migration: &Migration) -> Result<(), StoreError>;

    async fn get_migration(&self, name: &str) -> Result<Option<Migration>, StoreError>;

    async fn update_migration_status(
        &self,
        name: &str,
        status: MigrationStatus,
    ) -> Result<(), StoreError>;

    /// Reads just the persisted status; used by the processor's cooperative
    /// stop check between batches.
    async fn migration_status(&self, name: &str) -> Result<Option<MigrationStatus>, StoreError>;

    async fn set_time_left(&self, name: &str, time_left_ms: u64) -> Result<(), StoreError>;

    async fn push_task(&self, queue: &str, task: &MigrationTask) -> Result<(), StoreError>;

    async fn update_task(&self, queue: &str, task: &MigrationTask) -> Result<(), StoreError>;

    /// Fetches up to `limit` tasks with status Pending from the queue.
    ///
    /// This is the first pending page in key order, not a cursor: tasks
    /// published while a run is in flight may be picked up by a later batch
    /// or missed entirely for that run.
    async fn fetch_pending(
        &self,
        queue: &str,
        limit: usize,
    ) -> Result<Vec<MigrationTask>, StoreError>;

    /// Lists every task in the queue regardless of status, in key order.
    async fn list_tasks(&self, queue: &str) -> Result<Vec<MigrationTask>, StoreError>;

    async fn count_tasks(&self, queue: &str) -> Result<u64, StoreError>;

    async fn count_pending(&self, queue: &str) -> Result<u64, StoreError>;
}
