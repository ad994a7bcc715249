//! Compact command implementation.

use super::{format_size, CommandResult};
use std::path::Path;
use tabula_core::{inspect_log, Durability, SharedGroup};
use tracing::info;

/// Compaction outcome.
#[derive(Debug)]
pub struct CompactStats {
    /// Records before compaction.
    pub records_before: usize,
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction, or `None` for a dry run.
    pub bytes_after: Option<u64>,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> CommandResult<()> {
    println!("Compacting {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(path, dry_run)?;
    println!("  Records before: {}", stats.records_before);
    println!("  Size before:    {}", format_size(stats.bytes_before));
    if let Some(after) = stats.bytes_after {
        println!("  Size after:     {}", format_size(after));
        println!(
            "  Space saved:    {}",
            format_size(stats.bytes_before.saturating_sub(after))
        );
        println!();
        println!("✓ Compaction complete");
    }
    Ok(())
}

/// Rewrites the log at `path` as one snapshot unless `dry_run` is set.
pub fn compact(path: &Path, dry_run: bool) -> CommandResult<CompactStats> {
    let report = inspect_log(path)?;
    if let Some(error) = report.error {
        return Err(format!("refusing to compact a damaged log: {error}").into());
    }
    let db = SharedGroup::open(path, Durability::Full, true)?;
    let bytes_before = db.log_size()?;
    let bytes_after = if dry_run {
        None
    } else {
        let after = db.compact()?;
        info!(before = bytes_before, after, "compacted");
        Some(after)
    };
    Ok(CompactStats {
        records_before: report.records.len(),
        bytes_before,
        bytes_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::{ColumnType, LogRecordKind};

    fn create(path: &Path, commits: usize) {
        let db = SharedGroup::open(path, Durability::Full, false).unwrap();
        for i in 0..commits {
            let wt = db.begin_write().unwrap();
            let t = wt.get_table("t").unwrap();
            if i == 0 {
                t.add_column(ColumnType::Int, "n").unwrap();
                t.add_empty_row().unwrap();
            }
            t.set_long(0, 0, i as i64).unwrap();
            wt.commit().unwrap();
        }
    }

    #[test]
    fn dry_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.db");
        create(&path, 5);
        let stats = compact(&path, true).unwrap();
        assert_eq!(stats.records_before, 5);
        assert!(stats.bytes_after.is_none());
        assert_eq!(inspect_log(&path).unwrap().records.len(), 5);
    }

    #[test]
    fn compaction_leaves_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.db");
        create(&path, 10);
        let stats = compact(&path, false).unwrap();
        assert!(stats.bytes_after.unwrap() < stats.bytes_before);

        let report = inspect_log(&path).unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].kind, LogRecordKind::Snapshot);
    }
}
