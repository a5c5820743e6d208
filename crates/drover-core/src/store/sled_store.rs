use crate::{error::StoreError, store::QueueStore};
use async_trait::async_trait;
use model::{
    migration::{Migration, MigrationStatus},
    task::{MigrationTask, TaskStatus},
};
use std::path::Path;
use tracing::debug;

/// Sled-backed queue store. Values are JSON-encoded because task payloads
/// carry free-form `serde_json::Value` bodies, which need a self-describing
/// encoding.
pub struct SledQueueStore {
    db: sled::Db,
}

impl SledQueueStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(&path)?;
        debug!(path = %path.as_ref().display(), "queue store opened");
        Ok(Self { db })
    }

    #[inline]
    fn migration_key(name: &str) -> String {
        format!("mig:{name}")
    }

    #[inline]
    fn task_key(queue: &str, id: &uuid::Uuid) -> String {
        format!("task:{queue}:{id}")
    }

    #[inline]
    fn queue_prefix(queue: &str) -> String {
        format!("task:{queue}:")
    }

    fn load_migration(&self, name: &str) -> Result<Option<Migration>, StoreError> {
        match self.db.get(Self::migration_key(name))? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(StoreError::Decode)?,
            )),
            None => Ok(None),
        }
    }

    fn store_migration(&self, migration: &Migration) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(migration).map_err(StoreError::Encode)?;
        self.db.insert(Self::migration_key(&migration.name), bytes)?;
        Ok(())
    }

    fn scan_tasks(&self, queue: &str) -> impl Iterator<Item = Result<MigrationTask, StoreError>> {
        self.db
            .scan_prefix(Self::queue_prefix(queue))
            .map(|item| {
                let (_key, value) = item?;
                serde_json::from_slice(&value).map_err(StoreError::Decode)
            })
    }
}

#[async_trait]
impl QueueStore for SledQueueStore {
    async fn insert_migration(&self, migration: &Migration) -> Result<(), StoreError> {
        let key = Self::migration_key(&migration.name);
        let bytes = serde_json::to_vec(migration).map_err(StoreError::Encode)?;

        // compare_and_swap against an absent key enforces the one-record-per-
        // name invariant even when two instances race on the insert.
        self.db
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?
            .map_err(|_| StoreError::MigrationExists(migration.name.clone()))?;
        Ok(())
    }

    async fn get_migration(&self, name: &str) -> Result<Option<Migration>, StoreError> {
        self.load_migration(name)
    }

    async fn update_migration_status(
        &self,
        name: &str,
        status: MigrationStatus,
    ) -> Result<(), StoreError> {
        let mut migration = self
            .load_migration(name)?
            .ok_or_else(|| StoreError::MigrationNotFound(name.to_string()))?;
        migration.status = status;
        self.store_migration(&migration)
    }

    async fn migration_status(&self, name: &str) -> Result<Option<MigrationStatus>, StoreError> {
        Ok(self.load_migration(name)?.map(|m| m.status))
    }

    async fn set_time_left(&self, name: &str, time_left_ms: u64) -> Result<(), StoreError> {
        let mut migration = self
            .load_migration(name)?
            .ok_or_else(|| StoreError::MigrationNotFound(name.to_string()))?;
        migration.time_left_ms = Some(time_left_ms);
        self.store_migration(&migration)
    }

    async fn push_task(&self, queue: &str, task: &MigrationTask) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(task).map_err(StoreError::Encode)?;
        self.db.insert(Self::task_key(queue, &task.id), bytes)?;
        Ok(())
    }

    async fn update_task(&self, queue: &str, task: &MigrationTask) -> Result<(), StoreError> {
        let key = Self::task_key(queue, &task.id);
        if self.db.get(&key)?.is_none() {
            return Err(StoreError::TaskNotFound {
                id: task.id,
                queue: queue.to_string(),
            });
        }
        let bytes = serde_json::to_vec(task).map_err(StoreError::Encode)?;
        self.db.insert(key, bytes)?;
        Ok(())
    }

    async fn fetch_pending(
        &self,
        queue: &str,
        limit: usize,
    ) -> Result<Vec<MigrationTask>, StoreError> {
        let mut batch = Vec::with_capacity(limit);
        for task in self.scan_tasks(queue) {
            let task = task?;
            if task.status == TaskStatus::Pending {
                batch.push(task);
                if batch.len() == limit {
                    break;
                }
            }
        }
        Ok(batch)
    }

    async fn list_tasks(&self, queue: &str) -> Result<Vec<MigrationTask>, StoreError> {
        self.scan_tasks(queue).collect()
    }

    async fn count_tasks(&self, queue: &str) -> Result<u64, StoreError> {
        let mut count = 0u64;
        for item in self.db.scan_prefix(Self::queue_prefix(queue)) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    async fn count_pending(&self, queue: &str) -> Result<u64, StoreError> {
        let mut count = 0u64;
        for task in self.scan_tasks(queue) {
            if task?.status == TaskStatus::Pending {
                count += 1;
            }
        }
        Ok(count)
    }
}
