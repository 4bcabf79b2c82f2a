//! tail command - Print step log entries for a transaction

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde::Serialize;

use crate::cli::Context;
use crate::core::naming::is_sanitized;
use crate::core::ops::record::{RecordError, RecordStore};
use crate::core::ops::steplog::{StepLog, StepLogEntry};
use crate::core::types::TxId;
use crate::engine::exec::FINISH_STEP;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long to keep polling once the record is terminal but no `finish`
/// step has appeared.
const FINISH_GRACE: Duration = Duration::from_secs(2);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TailOutput<'a> {
    entries: &'a [StepLogEntry],
    next_cursor: usize,
}

/// Print step log entries starting at `cursor`.
pub fn tail(
    ctx: &Context,
    tx: &str,
    cursor: usize,
    max: usize,
    json: bool,
    follow: bool,
) -> Result<()> {
    if !is_sanitized(tx) {
        bail!("invalid transaction id '{}'", tx);
    }
    let tx = TxId::from(tx);
    let log = StepLog::from_config(&ctx.config);

    let (entries, next) = log.read_tail(&tx, cursor, max);
    if json {
        let output = TailOutput {
            entries: &entries,
            next_cursor: next,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_entries(&entries);
    if !follow {
        eprintln!("next cursor: {}", next);
        return Ok(());
    }

    let records = RecordStore::from_config(&ctx.config);
    let follower = Follower {
        log: &log,
        records: &records,
        poll: POLL_INTERVAL,
        grace: FINISH_GRACE,
    };
    let seen_finish = entries.iter().any(|e| e.step_id == FINISH_STEP);
    let cursor = follower.follow(&tx, next, max, seen_finish, print_entries)?;

    eprintln!("next cursor: {}", cursor);
    Ok(())
}

/// Polls a step log until its transaction is done.
struct Follower<'a> {
    log: &'a StepLog,
    records: &'a RecordStore,
    poll: Duration,
    grace: Duration,
}

impl Follower<'_> {
    /// Emit new entries until the record is terminal and the log is
    /// drained. Returns the final cursor.
    ///
    /// A terminal record alone does not end the loop: it waits for a
    /// `finish` step, or for `grace` to pass if none arrives (records
    /// failed by `reconcile` never get one).
    fn follow<F>(
        &self,
        tx: &TxId,
        mut cursor: usize,
        max: usize,
        mut seen_finish: bool,
        mut emit: F,
    ) -> Result<usize>
    where
        F: FnMut(&[StepLogEntry]),
    {
        let mut terminal_since: Option<Instant> = None;
        loop {
            let finished = is_finished(self.records, tx)?;
            let (entries, next) = self.log.read_tail(tx, cursor, max);
            emit(&entries);
            cursor = next;
            seen_finish |= entries.iter().any(|e| e.step_id == FINISH_STEP);

            if !entries.is_empty() {
                continue;
            }
            if finished {
                let since = *terminal_since.get_or_insert_with(Instant::now);
                if seen_finish || since.elapsed() >= self.grace {
                    return Ok(cursor);
                }
            }
            thread::sleep(self.poll);
        }
    }
}

fn print_entries(entries: &[StepLogEntry]) {
    for entry in entries {
        println!("{}", format_entry(entry));
    }
}

fn format_entry(entry: &StepLogEntry) -> String {
    format!(
        "{} {:<5} [{}] {}",
        entry.ts,
        entry.level.as_str().to_uppercase(),
        entry.step_id,
        entry.msg
    )
}

/// A missing record counts as finished so `--follow` on an unknown id exits.
fn is_finished(records: &RecordStore, tx: &TxId) -> Result<bool> {
    match records.load(tx) {
        Ok(record) => Ok(record.status.is_terminal()),
        Err(RecordError::NotFound(_)) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ops::record::{OpKind, TransactionRecord, TxStatus};
    use crate::core::ops::steplog::LogLevel;
    use crate::core::paths::StatePaths;
    use tempfile::TempDir;

    /// A terminal record with only a `begin` entry logged so far.
    fn terminal_without_finish(temp: &TempDir) -> (StepLog, RecordStore, TxId) {
        let paths = StatePaths::new(temp.path());
        let log = StepLog::new(paths.clone());
        let records = RecordStore::new(paths);
        let tx = TxId::from("tx-A");

        log.append(&tx, LogLevel::Info, "begin", "started");
        let mut record = TransactionRecord::new(tx.clone(), "pool-1", OpKind::Grow);
        record.set_status(TxStatus::Succeeded);
        records.save(&record).unwrap();
        (log, records, tx)
    }

    fn collect(follower: &Follower<'_>, tx: &TxId, cursor: usize) -> (Vec<String>, usize) {
        let mut steps = Vec::new();
        let cursor = follower
            .follow(tx, cursor, 100, false, |entries| {
                steps.extend(entries.iter().map(|e| e.step_id.clone()))
            })
            .unwrap();
        (steps, cursor)
    }

    #[test]
    fn follow_waits_for_finish_after_terminal_record() {
        let temp = TempDir::new().unwrap();
        let (log, records, tx) = terminal_without_finish(&temp);

        let late_log = log.clone();
        let late_tx = tx.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            late_log.append(&late_tx, LogLevel::Info, FINISH_STEP, "succeeded");
        });

        let follower = Follower {
            log: &log,
            records: &records,
            poll: Duration::from_millis(10),
            grace: Duration::from_secs(10),
        };
        let (steps, cursor) = collect(&follower, &tx, 0);
        writer.join().unwrap();

        assert_eq!(steps, vec!["begin".to_string(), FINISH_STEP.to_string()]);
        assert_eq!(cursor, 2);
    }

    #[test]
    fn follow_gives_up_after_grace_without_finish() {
        let temp = TempDir::new().unwrap();
        let (log, records, tx) = terminal_without_finish(&temp);

        let follower = Follower {
            log: &log,
            records: &records,
            poll: Duration::from_millis(10),
            grace: Duration::from_millis(50),
        };
        let (steps, cursor) = collect(&follower, &tx, 0);

        assert_eq!(steps, vec!["begin".to_string()]);
        assert_eq!(cursor, 1);
    }

    #[test]
    fn entry_format_includes_level_and_step() {
        let entry = StepLogEntry::new(LogLevel::Warn, "attach", "disk slow");
        let line = format_entry(&entry);
        assert!(line.ends_with("WARN  [attach] disk slow"), "got: {line}");
    }

    #[test]
    fn json_output_uses_camel_case_cursor() {
        let output = TailOutput {
            entries: &[],
            next_cursor: 3,
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["nextCursor"], 3);
        assert!(json["entries"].as_array().unwrap().is_empty());
    }
}
