//! Inspect command implementation.

use super::{format_size, CommandResult};
use serde::Serialize;
use std::path::Path;
use tabula_core::{inspect_log, Durability, LogRecordKind, SharedGroup};
use tabula_storage::{FileBackend, StorageBackend};

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Commit log size in bytes.
    pub log_size: u64,
    /// Latest committed version.
    pub version: u64,
    /// Number of commit records.
    pub commit_records: usize,
    /// Number of snapshot records.
    pub snapshot_records: usize,
    /// Every table, in group order.
    pub tables: Vec<TableInfo>,
}

/// Summary of one table.
#[derive(Debug, Serialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub column_count: usize,
    /// Columns as `(name, type)`, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<(String, String)>>,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_columns: bool, format: &str) -> CommandResult<()> {
    let result = inspect(path, show_columns)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Collects the inspection result for the database at `path`.
pub fn inspect(path: &Path, show_columns: bool) -> CommandResult<InspectResult> {
    if !path.is_file() {
        return Err(format!("No database found at {}", path.display()).into());
    }
    let log_size = FileBackend::open(path)?.size()?;
    let report = inspect_log(path)?;
    let count = |kind| report.records.iter().filter(|r| r.kind == kind).count();

    let db = SharedGroup::open(path, Durability::Full, true)?;
    let rt = db.begin_read()?;
    let mut tables = Vec::with_capacity(rt.table_count()?);
    for index in 0..rt.table_count()? {
        let name = rt.table_name(index)?;
        let table = rt.get_table(&name)?;
        let column_count = table.column_count()?;
        let columns = if show_columns {
            let mut columns = Vec::with_capacity(column_count);
            for column in 0..column_count {
                columns.push((
                    table.column_name(column)?,
                    table.column_type(column)?.to_string(),
                ));
            }
            Some(columns)
        } else {
            None
        };
        tables.push(TableInfo {
            rows: table.size()?,
            name,
            column_count,
            columns,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size,
        version: rt.version()?.as_u64(),
        commit_records: count(LogRecordKind::Commit),
        snapshot_records: count(LogRecordKind::Snapshot),
        tables,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Tabula Database Inspection");
    println!("==========================");
    println!();
    println!("Path:    {}", result.path);
    println!("Version: {}", result.version);
    println!();
    println!("Log:");
    println!("  Size:      {}", format_size(result.log_size));
    println!("  Commits:   {}", result.commit_records);
    println!("  Snapshots: {}", result.snapshot_records);
    println!();
    println!("Tables ({}):", result.tables.len());
    for table in &result.tables {
        println!(
            "  {} - {} rows, {} columns",
            table.name, table.rows, table.column_count
        );
        for (name, ty) in table.columns.iter().flatten() {
            println!("    {name}: {ty}");
        }
    }
}
