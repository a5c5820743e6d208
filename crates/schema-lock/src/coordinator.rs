use crate::{error::LockError, scripts};
use async_trait::async_trait;
use mysql_async::{Conn, Pool, prelude::*};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tokio::time::sleep;
use tracing::{info, warn};

/// How often a deferring instance re-checks whether the lock holder is done.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

const CREATE_HISTORY_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_history (
    version VARCHAR(255) NOT NULL PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

/// Observes whether another instance currently holds the lock table.
#[async_trait]
pub trait LockProbe: Send + Sync {
    async fn is_locked(&self) -> Result<bool, LockError>;
}

/// Returns true when the table was held elsewhere: polls until the holder
/// clears it, at which point the caller skips migration and assumes the
/// holder applied the pending scripts.
async fn defer_while_held(probe: &dyn LockProbe, poll: Duration) -> Result<bool, LockError> {
    if !probe.is_locked().await? {
        return Ok(false);
    }

    info!("lock table held by another instance, waiting for it to finish");
    while probe.is_locked().await? {
        sleep(poll).await;
    }
    info!("lock cleared, assuming schema is already migrated");
    Ok(true)
}

/// An open transaction holding the exclusive table lock. Dropping the guard
/// without `unlock` returns the connection to the pool, which releases the
/// lock implicitly; the explicit unlock path also commits.
pub struct LockGuard {
    conn: Conn,
}

/// Serializes schema migration across service instances racing at startup.
///
/// The sentinel lock table carries no data; a `LOCK TABLES … WRITE` on it is
/// the cross-instance mutex. An instance that finds the table already held
/// busy-waits until the holder finishes and then skips migration entirely,
/// on the assumption that the holder applied the pending scripts.
pub struct SchemaLockCoordinator {
    pool: Pool,
    lock_table: String,
    scripts_dir: PathBuf,
}

impl SchemaLockCoordinator {
    pub fn new(pool: Pool, lock_table: impl Into<String>, scripts_dir: impl Into<PathBuf>) -> Self {
        SchemaLockCoordinator {
            pool,
            lock_table: lock_table.into(),
            scripts_dir: scripts_dir.into(),
        }
    }

    /// Top-level entry: defer if another instance holds the lock, otherwise
    /// lock, apply pending scripts, and unlock.
    ///
    /// The unlock runs even when a script fails; the script error is
    /// surfaced afterwards. The busy-wait has no ceiling: if the holder
    /// crashed inside the locked window, the lock must be cleared manually.
    pub async fn run(&self) -> Result<(), LockError> {
        if defer_while_held(self, POLL_INTERVAL).await? {
            return Ok(());
        }

        let guard = self.lock().await?;
        let migrated = self.apply_pending().await;

        if let Err(err) = &migrated {
            warn!(error = %err, "schema migration failed, releasing the lock");
        }
        self.unlock(Some(guard)).await?;

        migrated
    }

    /// Checks whether any connection currently holds the lock table.
    pub async fn is_table_locked(&self) -> Result<bool, LockError> {
        let mut conn = self.pool.get_conn().await.map_err(LockError::Connect)?;
        let row: Option<(String, String, i64, i64)> = conn
            .exec_first(
                "SHOW OPEN TABLES WHERE In_use > 0 AND `Table` = ?",
                (self.lock_table.as_str(),),
            )
            .await?;
        Ok(row.map(|(_, _, in_use, _)| in_use > 0).unwrap_or(false))
    }

    /// Opens a transaction and takes the exclusive WRITE lock on the
    /// sentinel table, returning the guard that keeps both alive.
    pub async fn lock(&self) -> Result<LockGuard, LockError> {
        let mut conn = self.pool.get_conn().await.map_err(LockError::Connect)?;
        conn.query_drop("START TRANSACTION")
            .await
            .map_err(LockError::Begin)?;
        conn.query_drop(format!("LOCK TABLES `{}` WRITE", self.lock_table))
            .await
            .map_err(|source| LockError::Lock {
                table: self.lock_table.clone(),
                source,
            })?;
        Ok(LockGuard { conn })
    }

    /// Releases the table lock and commits. Calling this without a guard is
    /// a distinct error rather than a no-op.
    pub async fn unlock(&self, guard: Option<LockGuard>) -> Result<(), LockError> {
        let mut guard = guard.ok_or(LockError::NoActiveTransaction)?;
        guard
            .conn
            .query_drop("UNLOCK TABLES")
            .await
            .map_err(LockError::Unlock)?;
        guard
            .conn
            .query_drop("COMMIT")
            .await
            .map_err(LockError::Commit)?;
        Ok(())
    }

    /// Applies the scripts not yet recorded in `schema_history`, in lexical
    /// order, recording each version as it lands.
    async fn apply_pending(&self) -> Result<(), LockError> {
        let mut conn = self.pool.get_conn().await.map_err(LockError::Connect)?;
        conn.query_drop(CREATE_HISTORY_SQL).await?;

        let applied: HashSet<String> = conn
            .query::<String, _>("SELECT version FROM schema_history")
            .await?
            .into_iter()
            .collect();

        let scripts = scripts::discover(&self.scripts_dir)?;
        let pending = scripts::pending(scripts, &applied);
        if pending.is_empty() {
            info!("schema is up to date, no scripts to apply");
            return Ok(());
        }

        let started = Instant::now();
        info!(count = pending.len(), "applying schema scripts");

        for path in pending {
            self.apply_script(&mut conn, &path).await?;
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "schema migration finished"
        );
        Ok(())
    }

    async fn apply_script(&self, conn: &mut Conn, path: &Path) -> Result<(), LockError> {
        let version = scripts::version(path)?;
        let sql = tokio::fs::read_to_string(path).await?;

        for statement in scripts::split_statements(&sql) {
            conn.query_drop(statement)
                .await
                .map_err(|source| LockError::Script {
                    script: version.clone(),
                    source,
                })?;
        }

        conn.exec_drop(
            "INSERT INTO schema_history (version) VALUES (?)",
            (version.clone(),),
        )
        .await?;
        info!(script = %version, "applied");
        Ok(())
    }
}

#[async_trait]
impl LockProbe for SchemaLockCoordinator {
    async fn is_locked(&self) -> Result<bool, LockError> {
        self.is_table_locked().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    fn coordinator() -> SchemaLockCoordinator {
        // The pool connects lazily; no database is needed for these tests.
        let opts = mysql_async::Opts::from_url("mysql://drover@localhost:3306/drover").unwrap();
        SchemaLockCoordinator::new(Pool::new(opts), "drover_schema_lock", "/tmp/migrations")
    }

    /// Plays back a fixed sequence of lock observations, then reads free.
    struct ScriptedProbe {
        states: Mutex<VecDeque<bool>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(states: impl IntoIterator<Item = bool>) -> Self {
            ScriptedProbe {
                states: Mutex::new(states.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LockProbe for ScriptedProbe {
        async fn is_locked(&self) -> Result<bool, LockError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.states.lock().unwrap().pop_front().unwrap_or(false))
        }
    }

    #[tokio::test]
    async fn free_lock_proceeds_without_waiting() {
        let probe = ScriptedProbe::new([false]);

        let deferred = defer_while_held(&probe, Duration::from_millis(1))
            .await
            .unwrap();

        assert!(!deferred);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn held_lock_defers_until_the_holder_clears_it() {
        // Held on the first check and one poll, clear on the next; the
        // caller then skips migration entirely.
        let probe = ScriptedProbe::new([true, true, false]);

        let deferred = defer_while_held(&probe, Duration::from_millis(1))
            .await
            .unwrap();

        assert!(deferred);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unlock_without_transaction_is_an_error() {
        let err = coordinator().unlock(None).await.unwrap_err();
        assert!(matches!(err, LockError::NoActiveTransaction));
    }
}
