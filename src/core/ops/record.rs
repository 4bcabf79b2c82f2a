//! core::ops::record
//!
//! Durable transaction records.
//!
//! A [`TransactionRecord`] is the current-state summary of one pool
//! operation. The [`RecordStore`] persists it as a single JSON document
//! keyed by the transaction id and replaces it wholesale on every save.
//!
//! # Crash Safety Contract
//!
//! `save` writes the new document to a temp file in the same directory,
//! fsyncs it, renames it over the record, and fsyncs the directory so the
//! rename survives a power loss. A reader observes either the
//! previous complete record or the new complete record, never a partial
//! one. A failed save is a hard error: the durable state of the operation
//! is unknown and the caller must not assume the save took effect.
//!
//! # Storage
//!
//! - `<root>/pools/tx/<tx>.json` - One record per transaction
//!
//! # Example
//!
//! ```
//! use pooltx::core::ops::record::{OpKind, RecordStore, TransactionRecord, TxStatus};
//! use pooltx::core::paths::StatePaths;
//! use pooltx::core::types::TxId;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = RecordStore::new(StatePaths::new(dir.path()));
//!
//! let mut record = TransactionRecord::new(TxId::from("tx-A"), "pool-1", OpKind::Create);
//! record.set_status(TxStatus::Running);
//! store.save(&record).unwrap();
//!
//! assert_eq!(store.load(&record.id).unwrap(), record);
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::Config;
use crate::core::naming::is_sanitized;
use crate::core::paths::StatePaths;
use crate::core::types::{TxId, UtcTimestamp};

/// Errors from record operations.
#[derive(Debug, Error)]
pub enum RecordError {
    /// I/O error reading or writing record files.
    #[error("record i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("record json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record file not found.
    #[error("transaction record not found: {0}")]
    NotFound(String),

    /// The transaction id cannot be used as a file name.
    #[error("invalid transaction id for storage: {0:?}")]
    InvalidId(String),
}

/// The kind of pool operation a transaction performs.
///
/// Built-in kinds always map to their own variant: [`OpKind::other`] and
/// deserialization both go through [`OpKind::parse`], so `Other` never
/// holds a built-in name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum OpKind {
    Create,
    Grow,
    Shrink,
    Destroy,
    /// Any operation the dispatcher adds beyond the built-in kinds.
    Other(CustomKind),
}

/// Name of an operation kind outside the built-in set.
///
/// Only constructed through [`OpKind::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomKind(String);

impl CustomKind {
    /// The kind name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl OpKind {
    /// Parse an operation kind, falling back to [`OpKind::Other`].
    pub fn parse(s: &str) -> Self {
        match s {
            "create" => OpKind::Create,
            "grow" => OpKind::Grow,
            "shrink" => OpKind::Shrink,
            "destroy" => OpKind::Destroy,
            other => OpKind::Other(CustomKind(other.to_string())),
        }
    }

    /// An operation kind by name; built-in names yield the built-in variant.
    pub fn other(name: impl AsRef<str>) -> Self {
        Self::parse(name.as_ref())
    }

    /// The kind as written to disk.
    pub fn as_str(&self) -> &str {
        match self {
            OpKind::Create => "create",
            OpKind::Grow => "grow",
            OpKind::Shrink => "shrink",
            OpKind::Destroy => "destroy",
            OpKind::Other(kind) => kind.as_str(),
        }
    }
}

impl From<String> for OpKind {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<OpKind> for String {
    fn from(kind: OpKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Accepted, not started.
    Pending,
    /// Operation is in progress.
    Running,
    /// Operation completed successfully.
    Succeeded,
    /// Operation failed.
    Failed,
    /// Operation was cancelled.
    Cancelled,
}

impl TxStatus {
    /// Check if the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxStatus::Succeeded | TxStatus::Failed | TxStatus::Cancelled
        )
    }

    /// The status as written to disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Running => "running",
            TxStatus::Succeeded => "succeeded",
            TxStatus::Failed => "failed",
            TxStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Durable snapshot of one pool operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Transaction id.
    pub id: TxId,
    /// Target pool, as given by the caller.
    pub pool: String,
    /// Operation kind.
    pub kind: OpKind,
    /// Current status.
    pub status: TxStatus,
    /// When the transaction was accepted.
    pub created_at: UtcTimestamp,
    /// When the record last changed.
    pub updated_at: UtcTimestamp,
    /// Failure description for failed or cancelled transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operation-specific fields needed to resume or report.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl TransactionRecord {
    /// Create a pending record.
    pub fn new(id: TxId, pool: impl Into<String>, kind: OpKind) -> Self {
        let now = UtcTimestamp::now();
        Self {
            id,
            pool: pool.into(),
            kind,
            status: TxStatus::Pending,
            created_at: now,
            updated_at: now,
            error: None,
            details: serde_json::Map::new(),
        }
    }

    /// Attach operation-specific details.
    pub fn with_details(mut self, details: serde_json::Map<String, serde_json::Value>) -> Self {
        self.details = details;
        self
    }

    /// Change status and bump `updated_at`.
    pub fn set_status(&mut self, status: TxStatus) {
        self.status = status;
        self.updated_at = UtcTimestamp::now();
    }

    /// Mark the transaction failed with a reason.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.set_status(TxStatus::Failed);
    }
}

/// Store for transaction records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    paths: StatePaths,
}

impl RecordStore {
    /// Create a store from resolved configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.paths())
    }

    /// Create a store over explicit paths.
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    /// Persist a record atomically.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidId`] if the id is not filesystem-safe
    /// - [`RecordError::Io`] if any step of the write fails
    /// - [`RecordError::Json`] if serialization fails
    ///
    /// # Fault Injection
    ///
    /// When compiled with `cfg(test)` or the `fault_injection` feature,
    /// saves can be made to fail via [`fault_injection::fail_after`].
    pub fn save(&self, record: &TransactionRecord) -> Result<(), RecordError> {
        Self::check_id(&record.id)?;

        #[cfg(any(test, feature = "fault_injection"))]
        if fault_injection::should_fail() {
            return Err(RecordError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated save failure for fault injection testing",
            )));
        }

        fs::create_dir_all(self.paths.tx_dir())?;

        let path = self.paths.record_path(record.id.as_str());
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(record)?;

        let written = (|| {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
            fs::rename(&temp_path, &path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(RecordError::Io(e));
        }
        sync_dir(&self.paths.tx_dir())?;

        debug!(tx = %record.id, status = %record.status, "transaction record saved");
        Ok(())
    }

    /// Read a record.
    pub fn load(&self, id: &TxId) -> Result<TransactionRecord, RecordError> {
        Self::check_id(id)?;

        let path = self.paths.record_path(id.as_str());
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecordError::NotFound(id.to_string()));
            }
            Err(e) => return Err(RecordError::Io(e)),
        };
        Ok(serde_json::from_slice(&content)?)
    }

    /// Check whether a record exists.
    pub fn exists(&self, id: &TxId) -> bool {
        is_sanitized(id.as_str()) && self.paths.record_path(id.as_str()).exists()
    }

    /// List all transaction ids with a record.
    ///
    /// Returns ids sorted by modification time (newest first).
    pub fn list(&self) -> Result<Vec<TxId>, RecordError> {
        let dir = self.paths.tx_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut entries: Vec<_> = fs::read_dir(&dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().into_string().ok()?;
                let id = name.strip_suffix(".json")?;
                let mtime = entry.metadata().ok()?.modified().ok()?;
                Some((TxId::from(id), mtime))
            })
            .collect();

        // Sort by modification time (newest first), id for ties
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(entries.into_iter().map(|(id, _)| id).collect())
    }

    /// Mark every non-terminal record as failed.
    ///
    /// Locks do not survive a restart, so a record still `pending` or
    /// `running` after one describes an operation nobody is executing.
    /// This sweep is never run implicitly; the daemon opts in at startup.
    ///
    /// Returns the ids that were updated. Records that cannot be read are
    /// skipped; a failed save aborts the sweep.
    pub fn reconcile_interrupted(&self, reason: &str) -> Result<Vec<TxId>, RecordError> {
        let mut updated = Vec::new();

        for id in self.list()? {
            let mut record = match self.load(&id) {
                Ok(record) => record,
                Err(e) => {
                    debug!(tx = %id, error = %e, "skipping unreadable record");
                    continue;
                }
            };
            if record.status.is_terminal() {
                continue;
            }

            record.fail(reason);
            self.save(&record)?;
            info!(tx = %id, pool = %record.pool, "marked interrupted transaction failed");
            updated.push(id);
        }

        updated.sort();
        Ok(updated)
    }

    fn check_id(id: &TxId) -> Result<(), RecordError> {
        if is_sanitized(id.as_str()) {
            Ok(())
        } else {
            Err(RecordError::InvalidId(id.to_string()))
        }
    }
}

/// Flush a directory's entries (renames, creates) to disk.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Fault injection for testing persistence failures.
///
/// Only compiled with `cfg(test)` or the `fault_injection` feature.
#[cfg(any(test, feature = "fault_injection"))]
pub mod fault_injection {
    use std::cell::Cell;

    // Thread-local so parallel tests do not interfere.
    thread_local! {
        /// Fail the save after this many successful saves; 0 disables.
        static FAIL_AFTER_SAVES: Cell<usize> = const { Cell::new(0) };

        /// Current save count.
        static SAVE_COUNT: Cell<usize> = const { Cell::new(0) };
    }

    /// Make the `n`th save attempt (and every later one) fail.
    ///
    /// `fail_after(1)` fails the very next save. Set to 0 to disable.
    pub fn fail_after(n: usize) {
        FAIL_AFTER_SAVES.with(|c| c.set(n));
        SAVE_COUNT.with(|c| c.set(0));
    }

    /// Called by `RecordStore::save` before each write.
    pub fn should_fail() -> bool {
        FAIL_AFTER_SAVES.with(|threshold_cell| {
            let threshold = threshold_cell.get();
            if threshold == 0 {
                return false;
            }
            SAVE_COUNT.with(|count_cell| {
                let count = count_cell.get() + 1;
                count_cell.set(count);
                count >= threshold
            })
        })
    }

    /// Reset fault injection state.
    pub fn reset() {
        FAIL_AFTER_SAVES.with(|c| c.set(0));
        SAVE_COUNT.with(|c| c.set(0));
    }
}
