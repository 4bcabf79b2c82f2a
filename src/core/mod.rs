//! core
//!
//! Core types, path routing, configuration and the transactional
//! primitives.
//!
//! # Modules
//!
//! - [`types`] - Strong types: TxId, UtcTimestamp
//! - [`naming`] - Pool identifier sanitization
//! - [`paths`] - Centralized path routing under the state root
//! - [`config`] - Configuration resolution
//! - [`ops`] - Pool locks, transaction records and step logs
//!
//! # Design Principles
//!
//! - Every filesystem path is derived in [`paths`] from sanitized input
//! - Configuration is resolved once and passed to constructors
//! - Only record persistence failures are hard errors

pub mod config;
pub mod naming;
pub mod ops;
pub mod paths;
pub mod types;
