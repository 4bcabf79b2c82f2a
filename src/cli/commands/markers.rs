//! markers and sanitize commands - Lock marker inspection

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::naming;

/// List lock marker files under the state root.
pub fn markers(ctx: &Context) -> Result<()> {
    let paths = ctx.config.paths();
    let markers = paths
        .stale_markers()
        .with_context(|| format!("cannot read {}", paths.locks_dir().display()))?;

    if markers.is_empty() {
        eprintln!("No lock markers.");
        return Ok(());
    }

    for (pool, holder) in &markers {
        let holder = if holder.is_empty() { "-" } else { holder.as_str() };
        println!("{:<24} {}", pool, holder);
    }
    Ok(())
}

/// Print the sanitized form of an id.
pub fn sanitize(id: &str) -> Result<()> {
    println!("{}", naming::sanitize(id));
    Ok(())
}
