//! cli
//!
//! Command-line interface for inspecting pool transaction state.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Resolve configuration and install the log subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI runs as a separate process from the daemon, so it cannot see
//! the daemon's in-memory locks. It reads records, step logs and lock
//! markers from the state root; only `reconcile` writes.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;

/// Shared state for command handlers.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved configuration, with CLI overrides applied.
    pub config: Config,
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(dir) = cli.state_dir.clone() {
        config.state_dir = dir;
    }
    tracing::debug!(state_dir = %config.state_dir.display(), "resolved configuration");

    let ctx = Context { config };

    // Dispatch to command handler
    commands::dispatch(cli.command, &ctx)
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `warn`, or `debug` with `--debug`.
fn init_logging(debug: bool) {
    let default = if debug { "pooltx=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Ignore the error if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
