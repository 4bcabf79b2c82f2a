//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--state-dir <path>`: Inspect this state root instead of the configured one
//! - `--debug`: Enable debug logging

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// pooltx - inspect pool transaction state
#[derive(Parser, Debug)]
#[command(name = "pooltx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// State root to inspect (overrides config and POOLTX_STATE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show a transaction record
    #[command(
        name = "show",
        after_help = "\
EXAMPLES:
    pooltx show 3f2c9a4e-0b1d-4c55-9a51-7f0e1f9d2b6c
    pooltx show tx-A --json"
    )]
    Show {
        /// Transaction id
        tx: String,

        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },

    /// List transaction records, newest first
    #[command(name = "list")]
    List {
        /// Only show transactions for this pool
        #[arg(long)]
        pool: Option<String>,

        /// Only show pending or running transactions
        #[arg(long)]
        active: bool,
    },

    /// Print step log entries for a transaction
    #[command(
        name = "tail",
        long_about = "Print step log entries for a transaction.\n\n\
            Entries are addressed by cursor: the number of entries already consumed. \
            The cursor to resume from is printed to stderr after each batch \
            (or included in the JSON output).",
        after_help = "\
EXAMPLES:
    # Everything logged so far
    pooltx tail tx-A

    # Resume after the first 20 entries, at most 10 more
    pooltx tail tx-A --cursor 20 --max 10

    # Keep printing until the transaction finishes
    pooltx tail tx-A --follow"
    )]
    Tail {
        /// Transaction id
        tx: String,

        /// Number of entries to skip
        #[arg(long, default_value_t = 0)]
        cursor: usize,

        /// Maximum number of entries per batch
        #[arg(long, default_value_t = 1000)]
        max: usize,

        /// Print entries and the next cursor as JSON
        #[arg(long, conflicts_with = "follow")]
        json: bool,

        /// Poll for new entries until the transaction reaches a final status
        #[arg(short, long)]
        follow: bool,
    },

    /// Print the filesystem-safe token for a pool id
    #[command(name = "sanitize")]
    Sanitize {
        /// Pool id to sanitize
        id: String,
    },

    /// List lock marker files left on disk
    #[command(
        name = "markers",
        long_about = "List lock marker files left on disk.\n\n\
            Locks live in the daemon's memory; markers only mirror them. While the daemon \
            is stopped every marker listed here is stale and safe to delete."
    )]
    Markers,

    /// Mark pending and running transactions as failed
    #[command(
        name = "reconcile",
        long_about = "Mark pending and running transactions as failed.\n\n\
            Pool locks do not survive a daemon restart, so a transaction still marked \
            running afterwards has no one executing it. Run this only while the daemon \
            is stopped: it cannot tell an interrupted transaction from a live one."
    )]
    Reconcile {
        /// Error recorded on each updated transaction
        #[arg(long, default_value = "interrupted: daemon restarted")]
        reason: String,

        /// List what would be updated without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    pooltx completion bash > /etc/bash_completion.d/pooltx
    pooltx completion zsh > \"${fpath[1]}/_pooltx\""
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Shells supported by `completion`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tail_defaults() {
        let cli = Cli::try_parse_from(["pooltx", "tail", "tx-A"]).unwrap();
        match cli.command {
            Command::Tail {
                tx,
                cursor,
                max,
                json,
                follow,
            } => {
                assert_eq!(tx, "tx-A");
                assert_eq!(cursor, 0);
                assert_eq!(max, 1000);
                assert!(!json);
                assert!(!follow);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_state_dir_after_subcommand() {
        let cli = Cli::try_parse_from(["pooltx", "list", "--state-dir", "/srv/x"]).unwrap();
        assert_eq!(cli.state_dir, Some(PathBuf::from("/srv/x")));
    }

    #[test]
    fn json_conflicts_with_follow() {
        let result = Cli::try_parse_from(["pooltx", "tail", "tx-A", "--json", "--follow"]);
        assert!(result.is_err());
    }
}
