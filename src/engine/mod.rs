//! engine
//!
//! Runs pool operations as transactions.
//!
//! # Architecture
//!
//! The engine sits between the dispatch layer and [`crate::core::ops`].
//! Dispatchers never touch the lock manager, record store and step log
//! separately; they go through the [`Coordinator`], which enforces the
//! lock -> record -> log -> record -> unlock order.
//!
//! # Invariants
//!
//! - A record exists only for transactions that obtained the pool lock
//! - Every started transaction releases its lock, on success, failure,
//!   early drop or panic

pub mod exec;

// Re-exports for convenience
pub use exec::{ActiveTransaction, Coordinator, ExecuteError};
