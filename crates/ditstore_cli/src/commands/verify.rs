//! Verify command implementation.

use super::{replay, PartitionArgs};
use ditstore_core::{Directory, Inconsistency};
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path, partition: &PartitionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying log at {}", path.display());
    println!();

    let (dir, report) = replay(path, partition)?;
    println!(
        "Replayed {} transactions ({} discarded), data version {}",
        report.committed, report.discarded, report.version
    );
    if report.truncated_bytes > 0 {
        println!("Cut {} bytes of an incomplete record from the tail", report.truncated_bytes);
    }
    if report.skipped_partition_edits > 0 {
        println!(
            "Skipped {} edits for partitions other than {}",
            report.skipped_partition_edits, partition.id
        );
    }

    let problems = check(&dir, &partition.id)?;
    println!();
    if problems.is_empty() {
        println!("✓ Index verification passed");
        Ok(())
    } else {
        for problem in &problems {
            println!("  {problem}");
        }
        println!("✗ Index verification failed ({} problems)", problems.len());
        Err("Verification failed".into())
    }
}

fn check(dir: &Directory, id: &str) -> Result<Vec<Inconsistency>, Box<dyn std::error::Error>> {
    Ok(dir.verify(id)?)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{args, written_log};
    use super::*;

    #[test]
    fn replayed_log_is_consistent() {
        let log = written_log();
        assert!(run(log.path(), &args()).is_ok());
    }

    #[test]
    fn unknown_partition_id_replays_nothing() {
        let log = written_log();
        let mut other = args();
        other.id = "other".to_string();
        let (dir, report) = replay(log.path(), &other).unwrap();
        assert_eq!(report.replayed_edits, 0);
        assert!(check(&dir, "other").unwrap().is_empty());
    }
}
