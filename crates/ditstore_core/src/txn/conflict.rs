use crate::entry::EntryId;
use crate::error::CoreResult;
use crate::index::{IndexId, IndexKey};
use crate::partition::Partition;
use crate::types::DataVersion;
use std::fmt;

/// Something a transaction read or wrote, checked at commit for newer
/// committed writes.
///
/// Writes are recorded as exact pairs, reads of a forward key cover every
/// pair under it. Two transactions adding different children of the same
/// parent therefore never collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ConflictKey {
    Entry {
        partition: String,
        id: EntryId,
    },
    IndexKey {
        partition: String,
        index: IndexId,
        key: IndexKey,
    },
    IndexPair {
        partition: String,
        index: IndexId,
        key: IndexKey,
        id: EntryId,
    },
    Reverse {
        partition: String,
        index: IndexId,
        id: EntryId,
    },
}

impl ConflictKey {
    pub fn partition(&self) -> &str {
        match self {
            Self::Entry { partition, .. }
            | Self::IndexKey { partition, .. }
            | Self::IndexPair { partition, .. }
            | Self::Reverse { partition, .. } => partition,
        }
    }

    /// Version of the newest write under this key.
    pub fn latest_version(&self, partition: &dyn Partition) -> CoreResult<Option<DataVersion>> {
        Ok(match self {
            Self::Entry { id, .. } => partition.master_table()?.latest_version(*id),
            Self::IndexKey { index, key, .. } => partition.index(index)?.latest_key_version(key),
            Self::IndexPair { index, key, id, .. } => partition.index(index)?.latest_pair_version(key, *id),
            Self::Reverse { index, id, .. } => partition.index(index)?.latest_reverse_version(*id),
        })
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry { partition, id } => write!(f, "{partition}: entry {id}"),
            Self::IndexKey { partition, index, key } => write!(f, "{partition}: {index} key {key}"),
            Self::IndexPair {
                partition,
                index,
                key,
                id,
            } => write!(f, "{partition}: {index} pair {key} -> {id}"),
            Self::Reverse { partition, index, id } => write!(f, "{partition}: {index} keys of {id}"),
        }
    }
}
