//! Inspect command implementation.

use super::{replay, PartitionArgs};
use ditstore_core::{Directory, RecoveryReport};
use serde::Serialize;
use std::path::Path;

/// What one replayed partition holds.
#[derive(Debug, Serialize)]
pub struct PartitionInfo {
    /// Partition id.
    pub id: String,
    /// Suffix Dn.
    pub suffix: String,
    /// Live entries.
    pub entries: usize,
    /// Live `(key, id)` pairs per index.
    pub indices: Vec<IndexInfo>,
}

/// Size of one index.
#[derive(Debug, Serialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Live pairs.
    pub pairs: usize,
    /// System or user index.
    pub system: bool,
}

/// Runs the inspect command.
pub fn run(path: &Path, partition: &PartitionArgs, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (dir, report) = replay(path, partition)?;
    let info = collect(&dir)?;

    match format {
        "json" => {
            let out = serde_json::json!({
                "version": report.version.as_u64(),
                "committed": report.committed,
                "discarded": report.discarded,
                "replayed_edits": report.replayed_edits,
                "truncated_bytes": report.truncated_bytes,
                "partitions": info,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => print_text_output(&report, &info),
    }
    Ok(())
}

fn collect(dir: &Directory) -> Result<Vec<PartitionInfo>, Box<dyn std::error::Error>> {
    let version = dir.transactions().logical_data_version();
    let mut out = Vec::new();
    for partition in dir.partitions() {
        let entries = partition.master_table()?.count(version);
        let mut indices = Vec::new();
        for index in ditstore_core::index::SystemIndex::ALL {
            let index = partition.system_index(index)?;
            indices.push(IndexInfo {
                name: index.attribute().to_string(),
                pairs: index.cursor(version).remaining(),
                system: true,
            });
        }
        for index in partition.user_indices() {
            indices.push(IndexInfo {
                name: index.attribute().to_string(),
                pairs: index.cursor(version).remaining(),
                system: false,
            });
        }
        out.push(PartitionInfo {
            id: partition.id(),
            suffix: partition.suffix_dn().to_string(),
            entries,
            indices,
        });
    }
    Ok(out)
}

fn print_text_output(report: &RecoveryReport, partitions: &[PartitionInfo]) {
    println!("Log");
    println!("================");
    println!("Data version:     {}", report.version);
    println!("Committed txns:   {}", report.committed);
    println!("Discarded txns:   {}", report.discarded);
    println!("Replayed edits:   {}", report.replayed_edits);
    if report.truncated_bytes > 0 {
        println!("Cut from tail:    {} bytes", report.truncated_bytes);
    }

    for partition in partitions {
        println!();
        println!("Partition {} ({})", partition.id, partition.suffix);
        println!("================");
        println!("Entries: {}", partition.entries);
        for index in &partition.indices {
            let kind = if index.system { "system" } else { "user" };
            println!("  {:14} {:6} {} pairs", index.name, kind, index.pairs);
        }
    }
}
