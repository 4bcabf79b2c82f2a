//! core::ops
//!
//! Pool locking and transaction persistence.
//!
//! # Modules
//!
//! - [`lock`] - In-process per-pool locks with marker files
//! - [`record`] - Atomic transaction records
//! - [`steplog`] - Append-only step logs with cursor tailing
//!
//! # Architecture
//!
//! Every pool operation:
//! 1. Acquires the pool lock for its transaction id
//! 2. Saves a transaction record
//! 3. Appends step log entries as it progresses
//! 4. Saves the record with a terminal status
//! 5. Releases the pool lock
//!
//! The lock decides who may run, the record decides what happened, and
//! the step log only reports progress.

pub mod lock;
pub mod record;
pub mod steplog;

// Re-export main types for convenience
pub use lock::{PoolLockGuard, PoolLockManager};
pub use record::{CustomKind, OpKind, RecordError, RecordStore, TransactionRecord, TxStatus};
pub use steplog::{LogLevel, StepLog, StepLogEntry};
