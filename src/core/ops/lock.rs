//! core::ops::lock
//!
//! Exclusive per-pool locks for pool operations.
//!
//! # Architecture
//!
//! At most one operation may run against a pool at a time. The
//! [`PoolLockManager`] owns a single table mapping sanitized pool ids to
//! the transaction holding them, guarded by one mutex. Every acquire,
//! release and query goes through that mutex, so they are linearizable
//! with respect to each other.
//!
//! The table lives in process memory and is the only authority. Each held
//! lock is mirrored by a marker file for operators, but markers are never
//! read back: a restart drops every lock, whatever the markers say.
//!
//! # Storage
//!
//! - `<root>/locks/pool.<sanitized>.lock` - Marker containing the holder tx id
//!
//! # Invariants
//!
//! - At most one holder per sanitized pool id
//! - Acquisition is non-blocking (fails fast if held)
//! - Marker I/O failures never change the outcome of an operation
//! - Release is idempotent
//!
//! # Example
//!
//! ```
//! use pooltx::core::config::Config;
//! use pooltx::core::ops::lock::PoolLockManager;
//! use pooltx::core::types::TxId;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config { state_dir: dir.path().to_path_buf(), ..Default::default() };
//! let locks = PoolLockManager::new(&config);
//!
//! assert!(locks.acquire("pool-1", &TxId::from("tx-A")));
//! assert!(!locks.acquire("pool-1", &TxId::from("tx-B")));
//! assert_eq!(locks.current_holder("pool-1"), Some(TxId::from("tx-A")));
//!
//! locks.release("pool-1");
//! assert!(locks.acquire("pool-1", &TxId::from("tx-B")));
//! ```

use std::collections::HashMap;
use std::fs;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::naming::sanitize;
use crate::core::paths::StatePaths;
use crate::core::types::TxId;

/// In-process lock table for pools.
///
/// Construct one per process and share it (`Arc<PoolLockManager>`) with
/// every caller; two managers over the same state root do not see each
/// other's locks.
#[derive(Debug)]
pub struct PoolLockManager {
    paths: StatePaths,
    disabled: bool,
    held: Mutex<HashMap<String, TxId>>,
}

impl PoolLockManager {
    /// Create a lock manager from resolved configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_paths(config.paths(), config.disable_locking)
    }

    /// Create a lock manager over explicit paths.
    ///
    /// `disabled` turns every acquire into a success that records nothing.
    pub fn with_paths(paths: StatePaths, disabled: bool) -> Self {
        if disabled {
            warn!("pool locking is disabled; concurrent pool operations are not serialized");
        }
        Self {
            paths,
            disabled,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Whether locking is disabled.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Try to take the lock on `pool` for `tx`.
    ///
    /// Returns `false` without side effects if the pool is already held
    /// (by any transaction, including `tx`). Never waits.
    pub fn acquire(&self, pool: &str, tx: &TxId) -> bool {
        if self.disabled {
            return true;
        }

        let key = sanitize(pool);
        let mut held = self.table();

        if let Some(holder) = held.get(&key) {
            debug!(pool = %key, tx = %tx, holder = %holder, "pool lock busy");
            return false;
        }

        held.insert(key.clone(), tx.clone());
        self.write_marker(&key, tx);
        debug!(pool = %key, tx = %tx, "pool lock acquired");
        true
    }

    /// Release the lock on `pool`.
    ///
    /// Releasing an unlocked pool is a no-op.
    pub fn release(&self, pool: &str) {
        if self.disabled {
            return;
        }

        let key = sanitize(pool);
        let mut held = self.table();
        if let Some(holder) = held.remove(&key) {
            debug!(pool = %key, tx = %holder, "pool lock released");
        }
        self.remove_marker(&key);
    }

    /// Release the lock on `pool` only if `tx` still holds it.
    ///
    /// Returns `true` if the lock was released.
    pub fn release_if_held_by(&self, pool: &str, tx: &TxId) -> bool {
        if self.disabled {
            return false;
        }

        let key = sanitize(pool);
        let mut held = self.table();
        if held.get(&key) != Some(tx) {
            return false;
        }

        held.remove(&key);
        self.remove_marker(&key);
        debug!(pool = %key, tx = %tx, "pool lock released");
        true
    }

    /// The transaction currently holding `pool`, if any.
    pub fn current_holder(&self, pool: &str) -> Option<TxId> {
        if self.disabled {
            return None;
        }
        self.table().get(&sanitize(pool)).cloned()
    }

    /// Snapshot of every held lock as `(sanitized pool, holder)`, sorted
    /// by pool.
    pub fn holders(&self) -> Vec<(String, TxId)> {
        if self.disabled {
            return vec![];
        }

        let mut holders: Vec<_> = self
            .table()
            .iter()
            .map(|(pool, tx)| (pool.clone(), tx.clone()))
            .collect();
        holders.sort();
        holders
    }

    /// Try to take the lock, returning a guard that releases it on drop.
    ///
    /// # Example
    ///
    /// ```ignore
    /// if let Some(guard) = locks.try_lock("pool-1", &tx) {
    ///     // ... run the operation ...
    /// } else {
    ///     // pool busy
    /// }
    /// ```
    pub fn try_lock(&self, pool: &str, tx: &TxId) -> Option<PoolLockGuard<'_>> {
        self.acquire(pool, tx).then(|| PoolLockGuard {
            manager: self,
            pool: pool.to_string(),
            tx: tx.clone(),
            held: true,
        })
    }

    /// Lock the table, recovering from poisoning.
    ///
    /// Every critical section leaves the map consistent, so a panic in
    /// another thread never leaves it half-updated.
    fn table(&self) -> MutexGuard<'_, HashMap<String, TxId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_marker(&self, key: &str, tx: &TxId) {
        let path = self.paths.lock_marker_path(key);
        let result = fs::create_dir_all(self.paths.locks_dir())
            .and_then(|()| fs::write(&path, tx.as_str()));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write pool lock marker");
        }
    }

    fn remove_marker(&self, key: &str) {
        let path = self.paths.lock_marker_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove pool lock marker");
            }
        }
    }
}

/// A held pool lock.
///
/// The lock is released when the guard is dropped. Release only takes
/// effect while the guard's transaction is still the holder, so a guard
/// never drops a lock someone else acquired after a manual release.
#[derive(Debug)]
pub struct PoolLockGuard<'a> {
    manager: &'a PoolLockManager,
    pool: String,
    tx: TxId,
    held: bool,
}

impl PoolLockGuard<'_> {
    /// The pool this guard locks, as given by the caller.
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// The transaction holding the lock.
    pub fn tx(&self) -> &TxId {
        &self.tx
    }

    /// Check if the guard still holds the lock.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Release the lock explicitly. Safe to call more than once.
    pub fn release(&mut self) {
        if self.held {
            self.held = false;
            self.manager.release_if_held_by(&self.pool, &self.tx);
        }
    }
}

impl Drop for PoolLockGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
