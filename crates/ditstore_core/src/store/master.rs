use super::versioned::{Chain, Prior, VersionedMap};
use crate::entry::{Entry, EntryId};
use crate::types::DataVersion;

/// Authoritative id -> entry table of one partition.
#[derive(Debug, Default)]
pub struct MasterTable {
    entries: VersionedMap<EntryId, Entry>,
}

impl MasterTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry `id` as of `at`.
    #[must_use]
    pub fn get(&self, id: EntryId, at: DataVersion) -> Option<Entry> {
        self.entries.get(&id, at)
    }

    /// Every live entry as of `at`, in id order.
    #[must_use]
    pub fn scan(&self, at: DataVersion) -> Vec<(EntryId, Entry)> {
        self.entries.range(.., at)
    }

    /// Number of live entries as of `at`.
    #[must_use]
    pub fn count(&self, at: DataVersion) -> usize {
        self.entries.count(at)
    }

    /// Version of the newest write to `id`.
    #[must_use]
    pub fn latest_version(&self, id: EntryId) -> Option<DataVersion> {
        self.entries.latest_version(&id)
    }

    pub(crate) fn put(&self, id: EntryId, entry: Option<Entry>, version: DataVersion) -> Prior<Entry> {
        self.entries.put(id, entry, version)
    }

    pub(crate) fn restore(&self, id: EntryId, version: DataVersion, prior: Prior<Entry>) {
        self.entries.restore(&id, version, prior);
    }

    pub(crate) fn prune(&self, horizon: DataVersion) -> usize {
        self.entries.prune(horizon)
    }

    /// Full history, for state comparison.
    #[must_use]
    pub fn dump(&self) -> Vec<(EntryId, Chain<Entry>)> {
        self.entries.dump()
    }
}
