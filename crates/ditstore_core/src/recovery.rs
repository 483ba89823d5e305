//! Replay of the durable log into freshly initialized partitions.

use crate::error::{CoreError, CoreResult};
use crate::entry::EntryId;
use crate::index::IndexKey;
use crate::operation::keys::KeyDeriver;
use crate::partition::Partition;
use crate::types::{DataVersion, TransactionId};
use crate::wal::{DurableLog, LogRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// What [`recover`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Transactions replayed.
    pub committed: usize,
    /// Transactions without a commit record, or with an abort record.
    pub discarded: usize,
    /// Edits applied.
    pub replayed_edits: usize,
    /// Edits for user indices that no longer exist.
    pub skipped_index_edits: usize,
    /// Edits for partitions that are not registered.
    pub skipped_partition_edits: usize,
    /// `partition/index` names rebuilt from the master table.
    pub rebuilt_indices: Vec<String>,
    /// Highest committed version.
    pub version: DataVersion,
    /// First unused transaction id.
    pub next_txid: TransactionId,
    /// Bytes of incomplete trailing record cut from the log.
    pub truncated_bytes: u64,
}

/// Replays every committed transaction in `log` into `partitions`.
///
/// Edits are applied in log order at their transaction's commit version.
/// Every user index is then reconciled with the keys derived from the master
/// table at the recovered version, so an index configured after some of its
/// entries were written still covers them. An incomplete trailing record is
/// cut off so later appends start on a record boundary.
///
/// The partitions must be initialized and empty.
///
/// # Errors
///
/// [`CoreError::LogCorruption`] and [`CoreError::ChecksumMismatch`] for a
/// damaged log, and any failure applying an edit.
pub fn recover(log: &DurableLog, partitions: &BTreeMap<String, Arc<dyn Partition>>) -> CoreResult<RecoveryReport> {
    let (records, end) = {
        let mut iter = log.iter()?;
        let records = iter.by_ref().collect::<CoreResult<Vec<_>>>()?;
        (records, iter.offset())
    };
    let mut report = RecoveryReport::default();
    let size = log.size()?;
    if end < size {
        tracing::warn!(end, size, "cutting incomplete record from the log tail");
        log.truncate(end)?;
        report.truncated_bytes = size - end;
    }

    let mut started = BTreeSet::new();
    let mut committed: HashMap<TransactionId, DataVersion> = HashMap::new();
    let mut aborted = HashSet::new();
    let mut max_txid = 0u64;
    for (_, record) in &records {
        max_txid = max_txid.max(record.txid().as_u64());
        match record {
            LogRecord::Begin { txid } => {
                started.insert(*txid);
            }
            LogRecord::Commit { txid, version } => {
                committed.insert(*txid, *version);
                report.version = report.version.max(*version);
            }
            LogRecord::Abort { txid } => {
                aborted.insert(*txid);
            }
            LogRecord::Edit { .. } => {}
        }
    }
    committed.retain(|txid, _| !aborted.contains(txid));
    report.committed = committed.len();
    report.discarded = started.iter().filter(|txid| !committed.contains_key(txid)).count();
    report.next_txid = TransactionId::new(max_txid + 1);

    for (offset, record) in records {
        let LogRecord::Edit { txid, partition, edit } = record else {
            continue;
        };
        let Some(&version) = committed.get(&txid) else {
            continue;
        };
        let Some(target) = partitions.get(&partition) else {
            tracing::warn!(offset, %txid, %partition, "skipping edit for unregistered partition");
            report.skipped_partition_edits += 1;
            continue;
        };
        let active = match edit.activate(target.as_ref()) {
            Ok(active) => active,
            Err(CoreError::IndexNotFound { oid }) => {
                tracing::warn!(offset, %txid, %partition, %oid, "skipping edit for removed user index");
                report.skipped_index_edits += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        target.apply(&active, version)?;
        report.replayed_edits += 1;
    }

    for (id, partition) in partitions {
        let master = partition.master_table()?;
        let deriver = KeyDeriver::new(partition.as_ref());
        let entries = master.scan(report.version);
        for index in partition.user_indices() {
            let oid = index.id().oid().to_string();
            let expected: BTreeSet<(IndexKey, EntryId)> = entries
                .iter()
                .flat_map(|(entry_id, entry)| {
                    deriver
                        .user_keys(&oid, entry)
                        .into_iter()
                        .map(move |key| (key, *entry_id))
                })
                .collect();
            let present: BTreeSet<(IndexKey, EntryId)> = index.cursor(report.version).collect();
            let (mut added, mut removed) = (0usize, 0usize);
            for (key, entry_id) in expected.difference(&present) {
                index.apply(key, *entry_id, true, report.version);
                added += 1;
            }
            for (key, entry_id) in present.difference(&expected) {
                index.apply(key, *entry_id, false, report.version);
                removed += 1;
            }
            if added + removed > 0 {
                tracing::info!(partition = %id, index = %index.id(), added, removed, "rebuilt user index");
                report.rebuilt_indices.push(format!("{id}/{}", index.attribute()));
            }
        }
    }

    tracing::info!(
        version = %report.version,
        committed = report.committed,
        discarded = report.discarded,
        edits = report.replayed_edits,
        "recovery finished"
    );
    Ok(report)
}
