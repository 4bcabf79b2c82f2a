//! engine::exec
//!
//! The transaction coordinator.
//!
//! # Architecture
//!
//! The [`Coordinator`] is how the dispatch layer runs a pool operation. It
//! owns the lock manager, record store and step log and strings them
//! together in the only order that keeps them consistent.
//!
//! # Coordinator Contract
//!
//! `begin` MUST:
//! 1. Acquire the pool lock (fail fast with [`ExecuteError::Busy`])
//! 2. Save a `running` record (on failure: release the lock, return the error)
//! 3. Log a `begin` step
//!
//! Finishing MUST:
//! 1. Log a `finish` step
//! 2. Save the record with a terminal status (on failure: log an `error`
//!    step saying so)
//! 3. Release the pool lock, even if the save failed
//!
//! Logging before saving means a reader that sees a terminal record has
//! already been able to see the `finish` step.
//!
//! # Invariants
//!
//! - No record is saved for a transaction that did not get the lock
//! - The lock is released exactly once per successful `begin`
//! - Dropping an unfinished transaction releases the lock and leaves the
//!   record as last saved
//!
//! # Example
//!
//! ```
//! use pooltx::core::config::Config;
//! use pooltx::core::ops::{LogLevel, OpKind, TxStatus};
//! use pooltx::engine::Coordinator;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config { state_dir: dir.path().to_path_buf(), ..Default::default() };
//! let coordinator = Coordinator::new(&config);
//!
//! let tx = coordinator.begin("pool-1", OpKind::Grow, Default::default()).unwrap();
//! tx.step(LogLevel::Info, "add-device", "adding /dev/sdc");
//! let record = tx.succeed().unwrap();
//!
//! assert_eq!(record.status, TxStatus::Succeeded);
//! assert_eq!(coordinator.locks().current_holder("pool-1"), None);
//! ```

use std::fmt::Display;

use thiserror::Error;
use tracing::{info, warn};

use crate::core::config::Config;
use crate::core::naming::is_sanitized;
use crate::core::ops::lock::{PoolLockGuard, PoolLockManager};
use crate::core::ops::record::{OpKind, RecordError, RecordStore, TransactionRecord, TxStatus};
use crate::core::ops::steplog::{LogLevel, StepLog};
use crate::core::types::TxId;

/// Step id used for the entry written by `begin`.
pub const BEGIN_STEP: &str = "begin";

/// Step id used for the entry written when a transaction finishes.
pub const FINISH_STEP: &str = "finish";

/// Errors from running a transaction.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Another transaction holds the pool.
    #[error("pool '{pool}' is busy{}", held_by(.holder))]
    Busy {
        /// The pool that was requested
        pool: String,
        /// The holder at the time of the conflict, if still known
        holder: Option<TxId>,
    },

    /// The transaction id cannot be used as a file name.
    #[error("invalid transaction id: {0:?}")]
    InvalidId(String),

    /// The record could not be persisted; durable state is unknown.
    #[error("failed to persist transaction record: {0}")]
    Persist(#[from] RecordError),
}

fn held_by(holder: &Option<TxId>) -> String {
    holder
        .as_ref()
        .map(|h| format!(" (held by {})", h))
        .unwrap_or_default()
}

impl ExecuteError {
    /// Check if this is a pool conflict.
    pub fn is_busy(&self) -> bool {
        matches!(self, ExecuteError::Busy { .. })
    }
}

/// Runs pool operations as locked, recorded transactions.
///
/// Construct once per process and share behind an `Arc`.
#[derive(Debug)]
pub struct Coordinator {
    locks: PoolLockManager,
    records: RecordStore,
    log: StepLog,
}

impl Coordinator {
    /// Create a coordinator from resolved configuration.
    pub fn new(config: &Config) -> Self {
        Self::from_parts(
            PoolLockManager::new(config),
            RecordStore::from_config(config),
            StepLog::from_config(config),
        )
    }

    /// Create a coordinator from already-built components.
    pub fn from_parts(locks: PoolLockManager, records: RecordStore, log: StepLog) -> Self {
        Self {
            locks,
            records,
            log,
        }
    }

    /// The lock manager.
    pub fn locks(&self) -> &PoolLockManager {
        &self.locks
    }

    /// The record store.
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// The step log.
    pub fn log(&self) -> &StepLog {
        &self.log
    }

    /// Start a transaction on `pool` with a generated id.
    pub fn begin(
        &self,
        pool: &str,
        kind: OpKind,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ActiveTransaction<'_>, ExecuteError> {
        self.begin_with_id(TxId::new(), pool, kind, details)
    }

    /// Start a transaction on `pool` with a caller-supplied id.
    ///
    /// # Errors
    ///
    /// - [`ExecuteError::InvalidId`] if `tx` is not filesystem-safe
    /// - [`ExecuteError::Busy`] if another transaction holds the pool
    /// - [`ExecuteError::Persist`] if the initial record cannot be saved;
    ///   the lock is released before returning
    pub fn begin_with_id(
        &self,
        tx: TxId,
        pool: &str,
        kind: OpKind,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ActiveTransaction<'_>, ExecuteError> {
        if !is_sanitized(tx.as_str()) {
            return Err(ExecuteError::InvalidId(tx.to_string()));
        }

        let guard = self.locks.try_lock(pool, &tx).ok_or_else(|| ExecuteError::Busy {
            pool: pool.to_string(),
            holder: self.locks.current_holder(pool),
        })?;

        let mut record = TransactionRecord::new(tx, pool, kind).with_details(details);
        record.set_status(TxStatus::Running);
        // On failure the guard drops here and releases the pool.
        self.records.save(&record)?;

        self.log.append(
            &record.id,
            LogLevel::Info,
            BEGIN_STEP,
            &format!("{} started on pool {}", record.kind, record.pool),
        );
        info!(tx = %record.id, pool = %record.pool, kind = %record.kind, "transaction started");

        Ok(ActiveTransaction {
            coordinator: self,
            guard,
            record,
            finished: false,
        })
    }

    /// Run `op` inside a transaction and finish it from the outcome.
    ///
    /// `Ok` finishes as succeeded, `Err` as failed with the error's
    /// message. A panic in `op` unwinds through the lock guard, so the pool
    /// is released and the record stays `running`.
    pub fn run<F, E>(
        &self,
        pool: &str,
        kind: OpKind,
        details: serde_json::Map<String, serde_json::Value>,
        op: F,
    ) -> Result<TransactionRecord, ExecuteError>
    where
        F: FnOnce(&mut ActiveTransaction<'_>) -> Result<(), E>,
        E: Display,
    {
        let mut tx = self.begin(pool, kind, details)?;
        match op(&mut tx) {
            Ok(()) => tx.succeed(),
            Err(e) => tx.fail(e.to_string()),
        }
    }
}

/// A running transaction holding its pool lock.
#[derive(Debug)]
pub struct ActiveTransaction<'a> {
    coordinator: &'a Coordinator,
    guard: PoolLockGuard<'a>,
    record: TransactionRecord,
    finished: bool,
}

impl ActiveTransaction<'_> {
    /// The transaction id.
    pub fn id(&self) -> &TxId {
        &self.record.id
    }

    /// The record as last saved.
    pub fn record(&self) -> &TransactionRecord {
        &self.record
    }

    /// Append a step log entry. Never fails.
    pub fn step(&self, level: LogLevel, step_id: &str, msg: &str) {
        self.coordinator.log.append(&self.record.id, level, step_id, msg);
    }

    /// Replace the record's details and save it.
    ///
    /// On failure the in-memory record keeps the new details but the
    /// durable record may not.
    pub fn checkpoint(
        &mut self,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ExecuteError> {
        self.record.details = details;
        self.record.set_status(TxStatus::Running);
        self.coordinator.records.save(&self.record)?;
        Ok(())
    }

    /// Finish as succeeded.
    pub fn succeed(self) -> Result<TransactionRecord, ExecuteError> {
        self.finish(TxStatus::Succeeded, None)
    }

    /// Finish as failed.
    pub fn fail(self, error: impl Into<String>) -> Result<TransactionRecord, ExecuteError> {
        self.finish(TxStatus::Failed, Some(error.into()))
    }

    /// Finish as cancelled.
    pub fn cancel(self, reason: impl Into<String>) -> Result<TransactionRecord, ExecuteError> {
        self.finish(TxStatus::Cancelled, Some(reason.into()))
    }

    fn finish(
        mut self,
        status: TxStatus,
        error: Option<String>,
    ) -> Result<TransactionRecord, ExecuteError> {
        debug_assert!(status.is_terminal());

        self.record.error = error;
        self.record.set_status(status);

        let (level, msg) = match (&self.record.error, status) {
            (_, TxStatus::Succeeded) => (LogLevel::Info, "succeeded".to_string()),
            (Some(e), TxStatus::Cancelled) => (LogLevel::Warn, format!("cancelled: {}", e)),
            (Some(e), _) => (LogLevel::Error, format!("{}: {}", status, e)),
            (None, _) => (LogLevel::Error, status.to_string()),
        };
        self.step(level, FINISH_STEP, &msg);

        let saved = self.coordinator.records.save(&self.record);
        if let Err(e) = &saved {
            self.step(
                LogLevel::Error,
                FINISH_STEP,
                &format!("failed to persist final status: {}", e),
            );
        }

        self.guard.release();
        self.finished = true;
        info!(
            tx = %self.record.id,
            pool = %self.record.pool,
            status = %status,
            "transaction finished"
        );

        saved?;
        Ok(self.record.clone())
    }
}

impl Drop for ActiveTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                tx = %self.record.id,
                pool = %self.record.pool,
                "transaction dropped without finishing; pool released, record left as last saved"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ops::record::fault_injection;
    use crate::core::paths::StatePaths;
    use std::path::Path;
    use tempfile::TempDir;

    fn coordinator(dir: &Path) -> Coordinator {
        let config = Config {
            state_dir: dir.to_path_buf(),
            ..Default::default()
        };
        Coordinator::new(&config)
    }

    fn no_details() -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }

    #[test]
    fn begin_locks_records_and_logs() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());

        let tx = c.begin("pool-1", OpKind::Create, no_details()).unwrap();
        let id = tx.id().clone();

        assert_eq!(c.locks().current_holder("pool-1"), Some(id.clone()));
        let record = c.records().load(&id).unwrap();
        assert_eq!(record.status, TxStatus::Running);
        assert_eq!(record.pool, "pool-1");

        let entries = c.log().read_all(&id);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].step_id, BEGIN_STEP);
        drop(tx);
    }

    #[test]
    fn second_begin_is_busy() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());

        let tx = c
            .begin_with_id(TxId::from("tx-A"), "pool-1", OpKind::Grow, no_details())
            .unwrap();
        let err = c
            .begin_with_id(TxId::from("tx-B"), "pool-1", OpKind::Shrink, no_details())
            .unwrap_err();

        match &err {
            ExecuteError::Busy { pool, holder } => {
                assert_eq!(pool, "pool-1");
                assert_eq!(holder.as_ref(), Some(tx.id()));
            }
            other => panic!("expected Busy, got {other:?}"),
        }
        assert!(err.is_busy());
        assert!(err.to_string().contains("held by tx-A"));
        assert!(!c.records().exists(&TxId::from("tx-B")));
    }

    #[test]
    fn succeed_saves_and_releases() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());

        let tx = c.begin("pool-1", OpKind::Grow, no_details()).unwrap();
        tx.step(LogLevel::Info, "add", "adding device");
        let record = tx.succeed().unwrap();

        assert_eq!(record.status, TxStatus::Succeeded);
        assert_eq!(c.records().load(&record.id).unwrap(), record);
        assert_eq!(c.locks().current_holder("pool-1"), None);

        let steps: Vec<_> = c
            .log()
            .read_all(&record.id)
            .into_iter()
            .map(|e| e.step_id)
            .collect();
        assert_eq!(steps, vec![BEGIN_STEP, "add", FINISH_STEP]);
    }

    #[test]
    fn fail_and_cancel_record_reason() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());

        let failed = c
            .begin("pool-1", OpKind::Destroy, no_details())
            .unwrap()
            .fail("device busy")
            .unwrap();
        assert_eq!(failed.status, TxStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("device busy"));
        let last = c.log().read_all(&failed.id).pop().unwrap();
        assert_eq!(last.level, LogLevel::Error);

        let cancelled = c
            .begin("pool-1", OpKind::Grow, no_details())
            .unwrap()
            .cancel("user request")
            .unwrap();
        assert_eq!(cancelled.status, TxStatus::Cancelled);
        let last = c.log().read_all(&cancelled.id).pop().unwrap();
        assert_eq!(last.level, LogLevel::Warn);
        assert_eq!(c.locks().current_holder("pool-1"), None);
    }

    #[test]
    fn dropping_unfinished_releases_lock() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());

        let id = {
            let tx = c.begin("pool-1", OpKind::Grow, no_details()).unwrap();
            tx.id().clone()
        };

        assert_eq!(c.locks().current_holder("pool-1"), None);
        assert_eq!(c.records().load(&id).unwrap().status, TxStatus::Running);
    }

    #[test]
    fn checkpoint_persists_details() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());

        let mut tx = c.begin("pool-1", OpKind::Grow, no_details()).unwrap();
        let mut details = no_details();
        details.insert("balanced".into(), serde_json::json!(true));
        tx.checkpoint(details).unwrap();

        let record = c.records().load(tx.id()).unwrap();
        assert_eq!(record.details["balanced"], serde_json::json!(true));
        tx.succeed().unwrap();
    }

    #[test]
    fn run_maps_outcome_to_status() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());

        let ok = c
            .run("pool-1", OpKind::Create, no_details(), |tx| {
                tx.step(LogLevel::Info, "mkfs", "formatted");
                Ok::<(), String>(())
            })
            .unwrap();
        assert_eq!(ok.status, TxStatus::Succeeded);

        let failed = c
            .run("pool-1", OpKind::Grow, no_details(), |_| {
                Err("no space".to_string())
            })
            .unwrap();
        assert_eq!(failed.status, TxStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("no space"));
    }

    #[test]
    fn invalid_id_rejected_before_locking() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());

        let err = c
            .begin_with_id(TxId::from("../tx"), "pool-1", OpKind::Grow, no_details())
            .unwrap_err();
        assert!(matches!(err, ExecuteError::InvalidId(_)));
        assert_eq!(c.locks().current_holder("pool-1"), None);
    }

    #[test]
    fn persist_failure_on_begin_releases_lock() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());
        fault_injection::reset();

        fault_injection::fail_after(1);
        let err = c.begin("pool-1", OpKind::Grow, no_details()).unwrap_err();
        fault_injection::reset();

        assert!(matches!(err, ExecuteError::Persist(_)));
        assert_eq!(c.locks().current_holder("pool-1"), None);
        assert!(!StatePaths::new(temp.path()).lock_marker_path("pool-1").exists());
    }

    #[test]
    fn persist_failure_on_finish_still_releases_lock() {
        let temp = TempDir::new().unwrap();
        let c = coordinator(temp.path());
        fault_injection::reset();

        let tx = c.begin("pool-1", OpKind::Grow, no_details()).unwrap();
        let id = tx.id().clone();

        fault_injection::fail_after(1);
        let err = tx.succeed().unwrap_err();
        fault_injection::reset();

        assert!(matches!(err, ExecuteError::Persist(_)));
        assert_eq!(c.locks().current_holder("pool-1"), None);
        assert_eq!(c.records().load(&id).unwrap().status, TxStatus::Running);

        // The finish step precedes the save, so it is logged even though
        // the save failed; the failure follows it.
        let entries = c.log().read_all(&id);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].step_id, FINISH_STEP);
        assert_eq!(entries[1].msg, "succeeded");
        assert_eq!(entries[2].level, LogLevel::Error);
        assert!(entries[2].msg.starts_with("failed to persist final status"));
    }
}
