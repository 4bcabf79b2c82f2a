//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Builds the store or log it needs from the context
//! 2. Reads (or, for `reconcile`, updates) state under the state root
//! 3. Formats and displays output
//!
//! Handlers never take pool locks; locks belong to the daemon process.

mod markers;
mod records;
mod tail;

// Re-export command functions for testing and direct invocation
pub use markers::{markers, sanitize};
pub use records::{list, reconcile, show};
pub use tail::tail;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, shells};

use super::args::{Cli, Command, Shell};
use super::Context;

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Show { tx, json } => show(ctx, &tx, json),
        Command::List { pool, active } => list(ctx, pool.as_deref(), active),
        Command::Tail {
            tx,
            cursor,
            max,
            json,
            follow,
        } => tail(ctx, &tx, cursor, max, json, follow),
        Command::Sanitize { id } => sanitize(&id),
        Command::Markers => markers(ctx),
        Command::Reconcile { reason, dry_run } => reconcile(ctx, &reason, dry_run),
        Command::Completion { shell } => completion(shell),
    }
}

/// Write the completion script for `shell` to stdout.
pub fn completion(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut out = std::io::stdout();

    match shell {
        Shell::Bash => generate(shells::Bash, &mut cmd, &name, &mut out),
        Shell::Zsh => generate(shells::Zsh, &mut cmd, &name, &mut out),
        Shell::Fish => generate(shells::Fish, &mut cmd, &name, &mut out),
        Shell::PowerShell => generate(shells::PowerShell, &mut cmd, &name, &mut out),
    }

    Ok(())
}
