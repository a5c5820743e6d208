use crate::{
    error::ProcessError,
    strategy::{
        TaskStrategy,
        http::HttpStrategy,
        internal::{InternalHandler, InternalStrategy},
    },
};
use drover_core::{
    progress::estimate_time_left,
    retry::{RetryDisposition, RetryPolicy},
    store::QueueStore,
};
use futures::{StreamExt, stream};
use model::{
    migration::{ExecutionMode, Migration, MigrationStatus},
    task::{MigrationTask, TaskStatus},
};
use std::{sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pending tasks fetched per iteration. A batch is also the concurrency
/// barrier: the next fetch never starts before every task in the current
/// batch has settled.
pub const BATCH_SIZE: usize = 10;

/// Drives a migration's queue to completion: fetch a pending batch, execute
/// it with bounded concurrency, persist progress, and poll for a cooperative
/// stop until the queue runs dry.
pub struct TaskProcessor {
    store: Arc<dyn QueueStore>,
    internal: Option<Arc<dyn InternalHandler>>,
    batch_size: usize,
}

impl TaskProcessor {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        TaskProcessor {
            store,
            internal: None,
            batch_size: BATCH_SIZE,
        }
    }

    /// Registers the handler backing migrations with the internal mode.
    pub fn with_internal_handler(mut self, handler: Arc<dyn InternalHandler>) -> Self {
        self.internal = Some(handler);
        self
    }

    /// Runs the migration until its queue has no pending tasks (Finished),
    /// its persisted status reads Stopped, or the token is cancelled.
    ///
    /// Task-level failures never abort the run; they are confined to the
    /// task record. Store and setup failures do abort it.
    pub async fn process_tasks(
        &self,
        migration_name: &str,
        cancel: CancellationToken,
    ) -> Result<(), ProcessError> {
        let started = Instant::now();

        let Some(migration) = self.store.get_migration(migration_name).await? else {
            error!(migration = migration_name, "cannot start processing, migration not found");
            return Err(ProcessError::MigrationNotFound(migration_name.to_string()));
        };

        let strategy = self.build_strategy(&migration)?;
        let policy = strategy.retry_policy();
        let queue = migration.queue_name.clone();
        let workers = migration.num_threads.max(1);

        self.store
            .update_migration_status(migration_name, MigrationStatus::InProgress)
            .await?;
        info!(
            migration = migration_name,
            queue = %queue,
            workers,
            "migration started"
        );

        let mut processed: u64 = 0;
        let mut batch_no: u64 = 0;

        while !cancel.is_cancelled() {
            let batch = self.store.fetch_pending(&queue, self.batch_size).await?;

            if batch.is_empty() {
                self.store
                    .update_migration_status(migration_name, MigrationStatus::Finished)
                    .await?;
                let total = self.store.count_tasks(&queue).await?;
                info!(
                    migration = migration_name,
                    total_tasks = total,
                    "no more pending tasks, migration finished"
                );
                break;
            }

            let batch_started = Instant::now();
            let batch_len = batch.len();

            stream::iter(batch)
                .for_each_concurrent(workers, |task| {
                    let strategy = Arc::clone(&strategy);
                    let policy = policy.clone();
                    let queue = queue.clone();
                    async move {
                        self.process_one(task, &queue, strategy.as_ref(), &policy)
                            .await;
                    }
                })
                .await;

            processed += batch_len as u64;
            batch_no += 1;

            let tasks_left = self.store.count_pending(&queue).await?;
            let eta = estimate_time_left(batch_started.elapsed(), batch_len, tasks_left);
            self.store
                .set_time_left(migration_name, eta.as_millis() as u64)
                .await?;
            info!(
                migration = migration_name,
                batch = batch_no,
                processed,
                tasks_left,
                eta_ms = eta.as_millis() as u64,
                "batch complete"
            );

            // Cooperative stop: observed once per iteration, after the
            // barrier, so an in-flight batch always runs to completion.
            if self.store.migration_status(migration_name).await?
                == Some(MigrationStatus::Stopped)
            {
                info!(
                    migration = migration_name,
                    processed, "stop requested, halting after current batch"
                );
                cancel.cancel();
            }
        }

        info!(
            migration = migration_name,
            processed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task processing complete"
        );
        Ok(())
    }

    /// One worker's path for one task. Failures are recorded on the task
    /// and never propagate past this point.
    async fn process_one(
        &self,
        mut task: MigrationTask,
        queue: &str,
        strategy: &dyn TaskStrategy,
        policy: &RetryPolicy,
    ) {
        task.status = TaskStatus::InProgress;
        self.persist(queue, &task).await;

        // Every execution error is retryable; the budget makes it terminal.
        // The status write happens after the retry wrapper resolves, so the
        // contract is at-least-once: a crash between the side effect and the
        // write re-runs the task on the next run.
        let outcome = policy
            .run(|| strategy.execute(&task), |_| RetryDisposition::Retry)
            .await;

        match outcome {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                self.persist(queue, &task).await;
            }
            Err(retry_err) => {
                let err = retry_err.into_inner();
                error!(task = %task.name, error = %err, "task failed, rolling back");
                task.status = TaskStatus::Failed;
                task.error_message = Some(err.to_string());
                self.persist(queue, &task).await;

                if let Err(rollback_err) = strategy.rollback(&task).await {
                    warn!(task = %task.name, error = %rollback_err, "rollback failed");
                    task.rollback_error_message = Some(rollback_err.to_string());
                    self.persist(queue, &task).await;
                }
            }
        }
    }

    async fn persist(&self, queue: &str, task: &MigrationTask) {
        if let Err(err) = self.store.update_task(queue, task).await {
            error!(task = %task.name, error = %err, "failed to persist task status");
        }
    }

    fn build_strategy(&self, migration: &Migration) -> Result<Arc<dyn TaskStrategy>, ProcessError> {
        match &migration.mode {
            ExecutionMode::Http {
                endpoint,
                method,
                rollback_endpoint,
                rollback_method,
            } => {
                let strategy = HttpStrategy::new(
                    endpoint.clone(),
                    method,
                    rollback_endpoint.clone(),
                    rollback_method.as_deref(),
                    None,
                )?;
                Ok(Arc::new(strategy))
            }
            ExecutionMode::Internal => {
                let handler = self
                    .internal
                    .clone()
                    .ok_or_else(|| ProcessError::MissingHandler(migration.name.clone()))?;
                Ok(Arc::new(InternalStrategy::new(handler)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrategyError;
    use async_trait::async_trait;
    use drover_core::store::sled_store::SledQueueStore;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct StubHandler {
        executes: AtomicUsize,
        rollbacks: AtomicUsize,
        fail_execute: bool,
        fail_rollback: bool,
    }

    impl StubHandler {
        fn new(fail_execute: bool, fail_rollback: bool) -> Arc<Self> {
            Arc::new(StubHandler {
                executes: AtomicUsize::new(0),
                rollbacks: AtomicUsize::new(0),
                fail_execute,
                fail_rollback,
            })
        }
    }

    #[async_trait]
    impl InternalHandler for StubHandler {
        async fn execute(&self, _params: Option<&Value>) -> Result<(), StrategyError> {
            self.executes.fetch_add(1, Ordering::SeqCst);
            if self.fail_execute {
                Err(StrategyError::Handler("fail".into()))
            } else {
                Ok(())
            }
        }

        async fn rollback(&self, _params: Option<&Value>) -> Result<(), StrategyError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            if self.fail_rollback {
                Err(StrategyError::Handler("rollback fail".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Flips the migration to Stopped from inside the first executed task,
    /// emulating an external stop request landing mid-batch.
    struct StoppingHandler {
        store: Arc<dyn QueueStore>,
        migration: String,
        executes: AtomicUsize,
    }

    #[async_trait]
    impl InternalHandler for StoppingHandler {
        async fn execute(&self, _params: Option<&Value>) -> Result<(), StrategyError> {
            self.executes.fetch_add(1, Ordering::SeqCst);
            self.store
                .update_migration_status(&self.migration, MigrationStatus::Stopped)
                .await
                .unwrap();
            Ok(())
        }

        async fn rollback(&self, _params: Option<&Value>) -> Result<(), StrategyError> {
            Ok(())
        }
    }

    fn open_store(dir: &tempfile::TempDir) -> Arc<dyn QueueStore> {
        Arc::new(SledQueueStore::open(dir.path()).unwrap())
    }

    async fn seed(store: &Arc<dyn QueueStore>, name: &str, queue: &str, tasks: usize) {
        let migration = Migration::new(name, queue, ExecutionMode::Internal).with_num_threads(4);
        store.insert_migration(&migration).await.unwrap();
        for i in 0..tasks {
            store
                .push_task(queue, &MigrationTask::new(format!("task-{i}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn drains_the_queue_and_finishes() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        seed(&store, "m1", "q1", 2).await;

        let handler = StubHandler::new(false, false);
        let processor = TaskProcessor::new(store.clone()).with_internal_handler(handler.clone());
        processor
            .process_tasks("m1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            store.migration_status("m1").await.unwrap(),
            Some(MigrationStatus::Finished)
        );
        assert_eq!(store.count_pending("q1").await.unwrap(), 0);
        assert_eq!(handler.executes.load(Ordering::SeqCst), 2);
        assert_eq!(handler.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn multiple_batches_terminate_on_exhaustion() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        seed(&store, "m1", "q1", 25).await;

        let handler = StubHandler::new(false, false);
        let processor = TaskProcessor::new(store.clone()).with_internal_handler(handler.clone());
        processor
            .process_tasks("m1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handler.executes.load(Ordering::SeqCst), 25);
        assert_eq!(store.count_pending("q1").await.unwrap(), 0);
        assert_eq!(
            store.migration_status("m1").await.unwrap(),
            Some(MigrationStatus::Finished)
        );

        // The last batch stores a fresh ETA; an empty queue means zero left.
        let migration = store.get_migration("m1").await.unwrap().unwrap();
        assert_eq!(migration.time_left_ms, Some(0));
    }

    #[tokio::test]
    async fn failing_task_exhausts_retries_then_rolls_back_once() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        seed(&store, "m1", "q1", 1).await;

        let handler = StubHandler::new(true, false);
        let processor = TaskProcessor::new(store.clone()).with_internal_handler(handler.clone());
        processor
            .process_tasks("m1", CancellationToken::new())
            .await
            .unwrap();

        // Retry budget is 3 total invocations, rollback runs exactly once.
        assert_eq!(handler.executes.load(Ordering::SeqCst), 3);
        assert_eq!(handler.rollbacks.load(Ordering::SeqCst), 1);

        // Failed is terminal, so nothing stays pending and the run finishes.
        assert!(store.fetch_pending("q1", 10).await.unwrap().is_empty());
        assert_eq!(
            store.migration_status("m1").await.unwrap(),
            Some(MigrationStatus::Finished)
        );

        let tasks = store.list_tasks("q1").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert!(tasks[0].error_message.is_some());
        assert!(tasks[0].rollback_error_message.is_none());
    }

    #[tokio::test]
    async fn rollback_failure_is_recorded_separately() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        seed(&store, "m1", "q1", 1).await;

        let handler = StubHandler::new(true, true);
        let processor = TaskProcessor::new(store.clone()).with_internal_handler(handler.clone());
        processor
            .process_tasks("m1", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handler.rollbacks.load(Ordering::SeqCst), 1);

        let tasks = store.list_tasks("q1").await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert!(tasks[0].error_message.is_some());
        assert!(tasks[0].rollback_error_message.is_some());
    }

    #[tokio::test]
    async fn stop_halts_after_the_inflight_batch() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        seed(&store, "m1", "q1", 25).await;

        let handler = Arc::new(StoppingHandler {
            store: store.clone(),
            migration: "m1".to_string(),
            executes: AtomicUsize::new(0),
        });
        let processor = TaskProcessor::new(store.clone()).with_internal_handler(handler.clone());
        processor
            .process_tasks("m1", CancellationToken::new())
            .await
            .unwrap();

        // The first batch of 10 drains, the stop is observed at the barrier,
        // and no further batch is fetched.
        assert_eq!(handler.executes.load(Ordering::SeqCst), 10);
        assert_eq!(store.count_pending("q1").await.unwrap(), 15);
        assert_eq!(
            store.migration_status("m1").await.unwrap(),
            Some(MigrationStatus::Stopped)
        );
    }

    #[tokio::test]
    async fn missing_migration_is_an_error() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let processor = TaskProcessor::new(store);
        let err = processor
            .process_tasks("ghost", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::MigrationNotFound(_)));
    }

    #[tokio::test]
    async fn internal_mode_without_handler_is_an_error() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        seed(&store, "m1", "q1", 1).await;

        let processor = TaskProcessor::new(store);
        let err = processor
            .process_tasks("m1", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::MissingHandler(_)));
    }
}
