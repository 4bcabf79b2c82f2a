//! core::ops::steplog
//!
//! Append-only step logs for transactions.
//!
//! Each transaction owns one log file holding one JSON object per line.
//! Entries are never rewritten. The log is progress telemetry: the
//! [`TransactionRecord`](super::record::TransactionRecord) decides whether
//! an operation succeeded, so append failures are logged and swallowed.
//!
//! # Tailing
//!
//! Readers poll with a cursor, the number of entries already consumed.
//! [`StepLog::read_tail`] rescans the file from the start on every call,
//! skipping `cursor` entries. Logs are bounded by one operation's lifetime,
//! so the rescan stays cheap.
//!
//! # Storage
//!
//! - `<root>/pools/tx/<tx>.log` - `{"ts","level","stepId","msg"}` per line
//!
//! # Example
//!
//! ```
//! use pooltx::core::ops::steplog::{LogLevel, StepLog};
//! use pooltx::core::paths::StatePaths;
//! use pooltx::core::types::TxId;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let log = StepLog::new(StatePaths::new(dir.path()));
//! let tx = TxId::from("tx-A");
//!
//! log.append(&tx, LogLevel::Info, "step1", "starting");
//! log.append(&tx, LogLevel::Error, "step2", "failed");
//!
//! let (entries, next) = log.read_tail(&tx, 0, 10);
//! assert_eq!(entries.len(), 2);
//! assert_eq!(next, 2);
//!
//! let (entries, next) = log.read_tail(&tx, next, 10);
//! assert!(entries.is_empty());
//! assert_eq!(next, 2);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::naming::is_sanitized;
use crate::core::paths::StatePaths;
use crate::core::types::{TxId, UtcTimestamp};

/// Severity of a step log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    /// The level as written to disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One immutable progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLogEntry {
    /// When the entry was written.
    pub ts: UtcTimestamp,
    /// Severity.
    pub level: LogLevel,
    /// The step this entry belongs to.
    #[serde(rename = "stepId")]
    pub step_id: String,
    /// Free-text message.
    pub msg: String,
}

impl StepLogEntry {
    /// Create an entry stamped with the current time.
    pub fn new(level: LogLevel, step_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            ts: UtcTimestamp::now(),
            level,
            step_id: step_id.into(),
            msg: msg.into(),
        }
    }
}

/// Per-transaction step logs.
#[derive(Debug, Clone)]
pub struct StepLog {
    paths: StatePaths,
}

impl StepLog {
    /// Create a step log from resolved configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.paths())
    }

    /// Create a step log over explicit paths.
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    /// Append an entry, swallowing failures.
    ///
    /// Failures are logged at `warn`; they never reach the caller.
    pub fn append(&self, tx: &TxId, level: LogLevel, step_id: &str, msg: &str) {
        if let Err(e) = self.try_append(tx, level, step_id, msg) {
            warn!(tx = %tx, step = step_id, error = %e, "failed to append step log entry");
        }
    }

    /// Append an entry, reporting failures.
    ///
    /// The entry is written with a single `write_all` on a file opened in
    /// append mode, so concurrent appenders never interleave within a line.
    pub fn try_append(
        &self,
        tx: &TxId,
        level: LogLevel,
        step_id: &str,
        msg: &str,
    ) -> io::Result<()> {
        if !is_sanitized(tx.as_str()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid transaction id for storage: {:?}", tx.as_str()),
            ));
        }

        fs::create_dir_all(self.paths.tx_dir())?;

        let entry = StepLogEntry::new(level, step_id, msg);
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.paths.step_log_path(tx.as_str()))?;
        file.write_all(&line)
    }

    /// Read up to `max` entries after the first `cursor` entries.
    ///
    /// Returns the entries and the cursor to pass next time: the number of
    /// entries scanned up to and including the returned batch, or the total
    /// number of entries if the file ran out first. A missing log returns
    /// no entries and `cursor` unchanged.
    ///
    /// # Scanning rules
    ///
    /// - Blank lines are ignored
    /// - A final line without a terminator is an append still in progress
    ///   and is left for the next call
    /// - Lines that fail to parse occupy a cursor position but are not
    ///   returned
    pub fn read_tail(&self, tx: &TxId, cursor: usize, max: usize) -> (Vec<StepLogEntry>, usize) {
        if max == 0 || !is_sanitized(tx.as_str()) {
            return (vec![], cursor);
        }

        let path = self.paths.step_log_path(tx.as_str());
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to open step log");
                }
                return (vec![], cursor);
            }
        };

        let mut reader = BufReader::new(file);
        let mut entries: Vec<StepLogEntry> = Vec::new();
        let mut index = 0;
        let mut line = Vec::new();

        while entries.len() < max {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read step log");
                    break;
                }
            }

            if line.last() != Some(&b'\n') {
                break;
            }
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            let position = index;
            index += 1;
            if position < cursor {
                continue;
            }

            match serde_json::from_str::<StepLogEntry>(text) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    debug!(tx = %tx, line = position, error = %e, "skipping malformed log line");
                }
            }
        }

        (entries, index)
    }

    /// Read every entry in the log.
    pub fn read_all(&self, tx: &TxId) -> Vec<StepLogEntry> {
        self.read_tail(tx, 0, usize::MAX).0
    }
}
