//! Dump-log command implementation.

use super::CommandResult;
use serde::Serialize;
use std::path::Path;
use tabula_core::{inspect_log, LogRecordInfo, LogRecordKind};

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordOutput {
    /// Offset in the log file.
    pub offset: u64,
    /// Encoded length in bytes.
    pub len: usize,
    /// Record type.
    pub record_type: &'static str,
    /// Version the record produces.
    pub version: u64,
    /// Number of ops (commit records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ops: Option<usize>,
    /// Number of tables (snapshot records).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<usize>,
}

impl From<&LogRecordInfo> for RecordOutput {
    fn from(info: &LogRecordInfo) -> Self {
        let (record_type, ops, tables) = match info.kind {
            LogRecordKind::Commit => ("COMMIT", Some(info.ops), None),
            LogRecordKind::Snapshot => ("SNAPSHOT", None, Some(info.tables)),
        };
        Self {
            offset: info.offset,
            len: info.len,
            record_type,
            version: info.version.as_u64(),
            ops,
            tables,
        }
    }
}

/// Runs the dump-log command.
pub fn run(path: &Path, limit: Option<usize>, start_offset: u64, format: &str) -> CommandResult<()> {
    let (records, error) = read_records(path, limit, start_offset)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => print_text_output(&records),
    }
    if let Some(error) = error {
        eprintln!("log ends with an unreadable record: {error}");
    }
    Ok(())
}

/// Reads up to `limit` records at or after `start_offset`.
pub fn read_records(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
) -> CommandResult<(Vec<RecordOutput>, Option<String>)> {
    let report = inspect_log(path)?;
    let records = report
        .records
        .iter()
        .filter(|r| r.offset >= start_offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(RecordOutput::from)
        .collect();
    Ok((records, report.error))
}

fn print_text_output(records: &[RecordOutput]) {
    println!("{:>10}  {:<9} {:>8} {:>8}  detail", "offset", "type", "version", "bytes");
    for r in records {
        let detail = match (r.ops, r.tables) {
            (Some(ops), _) => format!("{ops} ops"),
            (_, Some(tables)) => format!("{tables} tables"),
            _ => String::new(),
        };
        println!(
            "{:>10}  {:<9} {:>8} {:>8}  {detail}",
            r.offset, r.record_type, r.version, r.len
        );
    }
    println!();
    println!("{} records", records.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::{ColumnType, Durability, SharedGroup};

    #[test]
    fn offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.db");
        {
            let db = SharedGroup::open(&path, Durability::Full, false).unwrap();
            for _ in 0..3 {
                let wt = db.begin_write().unwrap();
                let t = wt.get_table("t").unwrap();
                if t.column_count().unwrap() == 0 {
                    t.add_column(ColumnType::Int, "n").unwrap();
                }
                t.add_empty_row().unwrap();
                wt.commit().unwrap();
            }
        }
        let (all, error) = read_records(&path, None, 0).unwrap();
        assert!(error.is_none());
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| r.record_type == "COMMIT"));

        let (rest, _) = read_records(&path, Some(1), all[1].offset).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].version, 2);
    }
}
