//! Verify command implementation.

use super::CommandResult;
use std::path::Path;
use tabula_core::{inspect_log, ColumnType, Durability, SharedGroup};
use tracing::debug;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Records that passed the envelope and CRC checks.
    pub valid_records: usize,
    /// Bytes past the last valid record.
    pub trailing_bytes: u64,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Whether nothing is wrong with the file.
    pub fn is_ok(&self) -> bool {
        self.trailing_bytes == 0 && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> CommandResult<()> {
    println!("Verifying database at {}", path.display());
    println!();

    let result = verify(path)?;
    println!("  Valid records:  {}", result.valid_records);
    if result.trailing_bytes > 0 {
        println!(
            "  Trailing bytes: {} (dropped on next open)",
            result.trailing_bytes
        );
    }
    for error in &result.errors {
        println!("  Error: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every record, then replays the file and reads every table.
///
/// The replay only runs when the log is clean, so verification never
/// truncates a torn tail.
pub fn verify(path: &Path) -> CommandResult<VerifyResult> {
    let report = inspect_log(path)?;
    let mut result = VerifyResult {
        valid_records: report.records.len(),
        trailing_bytes: report.total_bytes - report.valid_bytes,
        errors: report.error.into_iter().collect(),
    };
    if !result.is_ok() {
        return Ok(result);
    }

    match replay(path) {
        Ok(rows) => debug!(rows, "replay succeeded"),
        Err(e) => result.errors.push(format!("replay failed: {e}")),
    }
    Ok(result)
}

fn replay(path: &Path) -> CommandResult<usize> {
    let db = SharedGroup::open(path, Durability::Full, true)?;
    let rt = db.begin_read()?;
    let mut rows = 0;
    for index in 0..rt.table_count()? {
        let table = rt.get_table(&rt.table_name(index)?)?;
        let mut columns = Vec::new();
        for column in 0..table.column_count()? {
            if table.column_type(column)? != ColumnType::Table {
                columns.push(column);
            }
        }
        for row in 0..table.size()? {
            for &column in &columns {
                table.get_value(column, row)?;
            }
        }
        rows += table.size()?;
    }
    Ok(rows)
}
