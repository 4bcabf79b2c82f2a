//! core::paths
//!
//! Centralized path routing for pooltx state.
//!
//! # Architecture
//!
//! Every file the subsystem writes lives under one state root. All of
//! those locations are computed here so that lock markers, records and
//! step logs never disagree about where they are.
//!
//! **Hard rule:** no other module joins path components onto the state
//! root. All paths go through `StatePaths`.
//!
//! # Storage Layout
//!
//! - `locks/pool.<sanitized pool id>.lock` - Lock marker (text, holder tx id)
//! - `pools/tx/<tx id>.json` - Transaction record
//! - `pools/tx/<tx id>.log` - Step log, one JSON object per line
//!
//! # Example
//!
//! ```
//! use pooltx::core::paths::StatePaths;
//! use std::path::PathBuf;
//!
//! let paths = StatePaths::new("/var/lib/pooltx");
//!
//! assert_eq!(
//!     paths.lock_marker_path("pool-1"),
//!     PathBuf::from("/var/lib/pooltx/locks/pool.pool-1.lock")
//! );
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::naming::sanitize;

/// State root used when nothing else is configured.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/pooltx";

/// Centralized path routing for pooltx state.
///
/// # Invariants
///
/// - Pool ids are always sanitized before they reach a path
/// - Transaction ids are used verbatim; callers validate them first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Create paths rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The state root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // =========================================================================
    // Locks
    // =========================================================================

    /// Directory holding lock markers.
    ///
    /// This is `<root>/locks/`.
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Path to the lock marker for a pool.
    ///
    /// This is `<root>/locks/pool.<sanitized>.lock`.
    pub fn lock_marker_path(&self, pool: &str) -> PathBuf {
        self.locks_dir().join(format!("pool.{}.lock", sanitize(pool)))
    }

    /// List lock marker files currently on disk.
    ///
    /// Markers are never read back to reconstruct lock state; after a
    /// restart anything listed here was left by a previous process.
    /// Returns `(sanitized pool id, holder tx id)` pairs sorted by pool.
    /// A missing locks directory yields an empty list.
    pub fn stale_markers(&self) -> std::io::Result<Vec<(String, String)>> {
        let dir = self.locks_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut markers: Vec<_> = fs::read_dir(&dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().into_string().ok()?;
                let pool = name.strip_prefix("pool.")?.strip_suffix(".lock")?;
                let holder = fs::read_to_string(entry.path()).unwrap_or_default();
                Some((pool.to_string(), holder.trim().to_string()))
            })
            .collect();

        markers.sort();
        Ok(markers)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Directory holding transaction records and step logs.
    ///
    /// This is `<root>/pools/tx/`.
    pub fn tx_dir(&self) -> PathBuf {
        self.root.join("pools").join("tx")
    }

    /// Path to a transaction record.
    ///
    /// This is `<root>/pools/tx/<tx>.json`.
    pub fn record_path(&self, tx: &str) -> PathBuf {
        self.tx_dir().join(format!("{}.json", tx))
    }

    /// Path to a transaction step log.
    ///
    /// This is `<root>/pools/tx/<tx>.log`.
    pub fn step_log_path(&self, tx: &str) -> PathBuf {
        self.tx_dir().join(format!("{}.log", tx))
    }

    /// Ensure the directory structure exists.
    ///
    /// Creates `<root>/locks/` and `<root>/pools/tx/` if needed.
    ///
    /// # Errors
    ///
    /// Returns an IO error if directory creation fails.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.locks_dir())?;
        fs::create_dir_all(self.tx_dir())?;
        Ok(())
    }
}

impl Default for StatePaths {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_root() {
        let paths = StatePaths::default();
        assert_eq!(paths.root(), Path::new("/var/lib/pooltx"));
    }

    #[test]
    fn lock_marker_path() {
        let paths = StatePaths::new("/state");
        assert_eq!(
            paths.lock_marker_path("pool-1"),
            PathBuf::from("/state/locks/pool.pool-1.lock")
        );
    }

    #[test]
    fn lock_marker_path_is_sanitized() {
        let paths = StatePaths::new("/state");
        let path = paths.lock_marker_path("../../etc/passwd");
        assert_eq!(path, PathBuf::from("/state/locks/pool.....etcpasswd.lock"));
        assert_eq!(path.parent(), Some(paths.locks_dir().as_path()));
    }

    #[test]
    fn record_and_log_paths() {
        let paths = StatePaths::new("/state");
        assert_eq!(
            paths.record_path("tx-A"),
            PathBuf::from("/state/pools/tx/tx-A.json")
        );
        assert_eq!(
            paths.step_log_path("tx-A"),
            PathBuf::from("/state/pools/tx/tx-A.log")
        );
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = StatePaths::new(temp.path().join("state"));

        paths.ensure_dirs().expect("ensure dirs");
        assert!(paths.locks_dir().is_dir());
        assert!(paths.tx_dir().is_dir());
    }

    #[test]
    fn stale_markers_lists_leftovers() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = StatePaths::new(temp.path());
        paths.ensure_dirs().expect("ensure dirs");

        fs::write(paths.lock_marker_path("pool-b"), "tx-2").expect("write marker");
        fs::write(paths.lock_marker_path("pool-a"), "tx-1\n").expect("write marker");
        fs::write(paths.locks_dir().join("unrelated.txt"), "x").expect("write other");

        let markers = paths.stale_markers().expect("list markers");
        assert_eq!(
            markers,
            vec![
                ("pool-a".to_string(), "tx-1".to_string()),
                ("pool-b".to_string(), "tx-2".to_string()),
            ]
        );
    }

    #[test]
    fn stale_markers_missing_dir_is_empty() {
        let temp = TempDir::new().expect("create temp dir");
        let paths = StatePaths::new(temp.path().join("nope"));
        assert!(paths.stale_markers().expect("list markers").is_empty());
    }
}
