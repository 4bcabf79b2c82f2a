//! show, list and reconcile commands - Transaction record inspection

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::naming::sanitize as sanitize_id;
use crate::core::ops::record::{RecordStore, TransactionRecord, TxStatus};
use crate::core::types::TxId;

/// Show one transaction record.
pub fn show(ctx: &Context, tx: &str, json: bool) -> Result<()> {
    let store = RecordStore::from_config(&ctx.config);
    let record = store
        .load(&TxId::from(tx))
        .with_context(|| format!("cannot read transaction '{}'", tx))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Transaction: {}", record.id);
    println!("Pool:        {}", record.pool);
    println!("Kind:        {}", record.kind);
    println!("Status:      {}", record.status);
    println!("Created:     {}", record.created_at);
    println!("Updated:     {}", record.updated_at);
    if let Some(error) = &record.error {
        println!("Error:       {}", error);
    }
    if !record.details.is_empty() {
        println!("Details:");
        for (key, value) in &record.details {
            println!("  {}: {}", key, value);
        }
    }

    Ok(())
}

/// List transaction records, newest first.
pub fn list(ctx: &Context, pool: Option<&str>, active: bool) -> Result<()> {
    let store = RecordStore::from_config(&ctx.config);
    let pool = pool.map(sanitize_id);

    let mut shown = 0;
    for id in store.list()? {
        let record = match store.load(&id) {
            Ok(record) => record,
            Err(e) => {
                eprintln!("warning: skipping {}: {}", id, e);
                continue;
            }
        };
        if !matches_filter(&record, pool.as_deref(), active) {
            continue;
        }

        println!(
            "{}  {:<16} {:<8} {:<10} {}",
            record.id, record.pool, record.kind, record.status, record.updated_at
        );
        shown += 1;
    }

    if shown == 0 {
        eprintln!("No transactions found.");
    }
    Ok(())
}

/// Mark non-terminal records as failed.
pub fn reconcile(ctx: &Context, reason: &str, dry_run: bool) -> Result<()> {
    let store = RecordStore::from_config(&ctx.config);

    if dry_run {
        let mut candidates = Vec::new();
        for id in store.list()? {
            if let Ok(record) = store.load(&id) {
                if !record.status.is_terminal() {
                    candidates.push(record);
                }
            }
        }
        candidates.sort_by(|a, b| a.id.cmp(&b.id));

        for record in &candidates {
            println!("would fail {} ({} on {})", record.id, record.status, record.pool);
        }
        println!("{} transaction(s) would be updated", candidates.len());
        return Ok(());
    }

    let updated = store
        .reconcile_interrupted(reason)
        .context("failed to reconcile transaction records")?;
    for id in &updated {
        println!("failed {}", id);
    }
    println!("{} transaction(s) updated", updated.len());
    Ok(())
}

/// Pool ids are compared by their sanitized form, matching how locks key them.
fn matches_filter(record: &TransactionRecord, pool: Option<&str>, active: bool) -> bool {
    if active && !matches!(record.status, TxStatus::Pending | TxStatus::Running) {
        return false;
    }
    match pool {
        Some(pool) => sanitize_id(&record.pool) == pool,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ops::record::OpKind;

    fn record(pool: &str, status: TxStatus) -> TransactionRecord {
        let mut record = TransactionRecord::new(TxId::from("tx"), pool, OpKind::Create);
        record.set_status(status);
        record
    }

    #[test]
    fn filter_by_pool_uses_sanitized_ids() {
        let rec = record("tank/data", TxStatus::Running);
        assert!(matches_filter(&rec, Some("tankdata"), false));
        assert!(!matches_filter(&rec, Some("tank"), false));
        assert!(matches_filter(&rec, None, false));
    }

    #[test]
    fn filter_active_only() {
        assert!(matches_filter(&record("p", TxStatus::Pending), None, true));
        assert!(matches_filter(&record("p", TxStatus::Running), None, true));
        assert!(!matches_filter(&record("p", TxStatus::Failed), None, true));
        assert!(matches_filter(&record("p", TxStatus::Failed), None, false));
    }
}
