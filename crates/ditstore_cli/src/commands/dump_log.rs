//! Dump-log command implementation.

use super::log_path;
use ditstore_core::wal::{DurableLog, LogRecord};
use ditstore_storage::FileBackend;
use serde::Serialize;
use std::path::Path;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Transaction id.
    pub txid: u64,
    /// Partition id (edits only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    /// Data version (commits only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// One-line description of the edit (edits only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit: Option<String>,
}

impl LogRecordInfo {
    fn new(offset: u64, record: &LogRecord) -> Self {
        let mut info = Self {
            offset,
            record_type: format!("{:?}", record.record_type()).to_uppercase(),
            txid: record.txid().as_u64(),
            partition: None,
            version: None,
            edit: None,
        };
        match record {
            LogRecord::Edit { partition, edit, .. } => {
                info.partition = Some(partition.clone());
                info.edit = Some(edit.to_string());
            }
            LogRecord::Commit { version, .. } => info.version = Some(version.as_u64()),
            LogRecord::Begin { .. } | LogRecord::Abort { .. } => {}
        }
        info
    }
}

/// Runs the dump-log command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = FileBackend::open(&log_path(path)?)?;
    let log = DurableLog::new(Box::new(backend));
    let records = read_records(&log, start_offset, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

fn read_records(
    log: &DurableLog,
    start_offset: u64,
    limit: Option<usize>,
) -> Result<Vec<LogRecordInfo>, Box<dyn std::error::Error>> {
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    for item in log.iter()? {
        let (offset, record) = item?;
        if offset < start_offset {
            continue;
        }
        if records.len() >= max_records {
            break;
        }
        records.push(LogRecordInfo::new(offset, &record));
    }
    Ok(records)
}

fn print_text_output(records: &[LogRecordInfo]) {
    println!("Log Records ({} total)", records.len());
    println!("================");
    println!();

    for record in records {
        print!("[{:08}] {:6} txid={}", record.offset, record.record_type, record.txid);
        if let Some(version) = record.version {
            print!(" version={version}");
        }
        if let Some(ref partition) = record.partition {
            print!(" partition={partition}");
        }
        if let Some(ref edit) = record.edit {
            print!(" {edit}");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::written_log;
    use super::super::LOG_FILE;
    use super::*;

    fn open(dir: &tempfile::TempDir) -> DurableLog {
        DurableLog::new(Box::new(FileBackend::open(&dir.path().join(LOG_FILE)).unwrap()))
    }

    #[test]
    fn records_come_back_framed_by_transaction() {
        let dir = written_log();
        let records = read_records(&open(&dir), 0, None).unwrap();
        assert_eq!(records.first().unwrap().record_type, "BEGIN");
        let commits: Vec<_> = records.iter().filter(|r| r.record_type == "COMMIT").collect();
        assert_eq!(commits.len(), 4);
        assert_eq!(commits.last().unwrap().version, Some(4));
        assert!(records
            .iter()
            .filter(|r| r.record_type == "EDIT")
            .all(|r| r.partition.as_deref() == Some("example") && r.edit.is_some()));
    }

    #[test]
    fn limit_and_offset() {
        let dir = written_log();
        let all = read_records(&open(&dir), 0, None).unwrap();
        let tail = read_records(&open(&dir), all[2].offset, Some(3)).unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].offset, all[2].offset);
    }
}
