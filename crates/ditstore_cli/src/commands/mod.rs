//! CLI command implementations.

pub mod dump_log;
pub mod inspect;
pub mod verify;

use clap::Args;
use ditstore_core::{Config, Directory, Dn, PartitionConfig, RecoveryReport, Schema, StorePartition};
use ditstore_storage::FileBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the log file inside the directory given with `--path`.
pub const LOG_FILE: &str = "ditstore.log";

/// The partition to replay the log into.
#[derive(Debug, Clone, Args)]
pub struct PartitionArgs {
    /// Partition id the log was written with
    #[arg(long, default_value = "example")]
    pub id: String,

    /// Suffix Dn of the partition
    #[arg(long, default_value = "dc=example,dc=com")]
    pub suffix: String,

    /// Attribute with a user index (repeatable)
    #[arg(long = "index")]
    pub indices: Vec<String>,
}

impl PartitionArgs {
    fn config(&self) -> Result<PartitionConfig, Box<dyn std::error::Error>> {
        let suffix = Dn::parse(&self.suffix)?;
        Ok(self
            .indices
            .iter()
            .fold(PartitionConfig::new(&self.id, suffix), |config, attribute| config.index(attribute)))
    }
}

/// Location of the log file under `path`.
pub fn log_path(path: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log = path.join(LOG_FILE);
    if !log.exists() {
        return Err(format!("log file not found at {}", log.display()).into());
    }
    Ok(log)
}

/// Opens the log under `path` and replays it into one partition.
pub fn replay(
    path: &Path,
    partition: &PartitionArgs,
) -> Result<(Directory, RecoveryReport), Box<dyn std::error::Error>> {
    let backend = FileBackend::open(&log_path(path)?)?;
    let schema = Arc::new(Schema::core());
    let dir = Directory::open(Box::new(backend), schema.clone(), Config::default());
    dir.add_partition(Arc::new(StorePartition::from_config(schema, partition.config()?)))?;
    let report = dir.recover()?;
    tracing::debug!(committed = report.committed, version = %report.version, "log replayed");
    Ok((dir, report))
}
