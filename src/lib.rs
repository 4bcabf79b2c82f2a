//! pooltx - Pool transaction and locking control plane
//!
//! pooltx serializes mutating operations on storage pools and records what
//! each operation did: one exclusive lock per pool, a durable JSON record per
//! transaction, and an append-only step log that clients can tail by cursor.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface for inspecting state on disk
//! - [`engine`] - Runs an operation under a pool lock as a recorded transaction
//! - [`core`] - Domain types, paths, config, locks, records and step logs
//!
//! # Correctness Invariants
//!
//! 1. At most one transaction holds a pool's lock at a time
//! 2. A reader never observes a partially written transaction record
//! 3. Step log entries are never modified or removed once appended
//! 4. Lock state lives in memory; marker files never grant a lock

pub mod cli;
pub mod core;
pub mod engine;
