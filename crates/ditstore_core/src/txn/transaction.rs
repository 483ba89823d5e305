use super::conflict::ConflictKey;
use super::overlay::Overlay;
use crate::entry::{Entry, EntryId};
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexId, IndexKey};
use crate::logedit::{ActiveEdit, EntryChange, EntryModification, IndexChange, IndexModification, LogEdit};
use crate::name::Dn;
use crate::partition::Partition;
use crate::types::{DataVersion, EditSequence, TransactionId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::thread::ThreadId;

/// Read-only or read-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only; emitting an edit is an error.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// Lifecycle of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting reads and edits.
    Active,
    /// Changes published.
    Committed,
    /// Changes discarded.
    Aborted,
}

/// One emitted edit and the partition it targets.
#[derive(Debug, Clone)]
pub(crate) struct Change {
    pub partition: Arc<dyn Partition>,
    pub edit: ActiveEdit,
}

/// Position to roll an active transaction back to.
#[derive(Debug)]
pub(crate) struct Savepoint {
    changes: usize,
    sequence: u64,
    overlays: HashMap<String, Overlay>,
}

/// A unit of work bound to one thread.
///
/// Reads see committed state as of [`start_version`](Self::start_version)
/// with the transaction's own uncommitted edits laid over it.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    mode: TransactionMode,
    start_version: DataVersion,
    state: TransactionState,
    thread: ThreadId,
    /// Snapshot registration still held with the manager.
    snapshot_held: bool,
    next_sequence: u64,
    changes: Vec<Change>,
    partitions: BTreeMap<String, Arc<dyn Partition>>,
    overlays: HashMap<String, Overlay>,
    read_set: BTreeSet<ConflictKey>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, mode: TransactionMode, start_version: DataVersion, thread: ThreadId) -> Self {
        Self {
            id,
            mode,
            start_version,
            state: TransactionState::Active,
            thread,
            snapshot_held: true,
            next_sequence: 0,
            changes: Vec::new(),
            partitions: BTreeMap::new(),
            overlays: HashMap::new(),
            read_set: BTreeSet::new(),
        }
    }

    /// Transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Committed version this transaction reads at.
    #[must_use]
    pub fn start_version(&self) -> DataVersion {
        self.start_version
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// True until committed or aborted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Emitted edits with their partition ids, in emission order.
    pub fn changes(&self) -> impl Iterator<Item = (String, &ActiveEdit)> {
        self.changes.iter().map(|c| (c.partition.id(), &c.edit))
    }

    /// Number of emitted edits.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn thread(&self) -> ThreadId {
        self.thread
    }

    pub(crate) fn pending(&self) -> &[Change] {
        &self.changes
    }

    pub(crate) fn partitions(&self) -> impl Iterator<Item = &Arc<dyn Partition>> {
        self.partitions.values()
    }

    pub(crate) fn partition(&self, id: &str) -> Option<&Arc<dyn Partition>> {
        self.partitions.get(id)
    }

    pub(crate) fn read_set(&self) -> &BTreeSet<ConflictKey> {
        &self.read_set
    }

    /// Exact keys this transaction writes.
    pub(crate) fn write_set(&self) -> BTreeSet<ConflictKey> {
        self.changes
            .iter()
            .map(|change| {
                let partition = change.partition.id();
                match &change.edit {
                    ActiveEdit::Entry(e) => ConflictKey::Entry { partition, id: e.id },
                    ActiveEdit::Index(b) => {
                        let m = b.modification();
                        ConflictKey::IndexPair {
                            partition,
                            index: b.index().id().clone(),
                            key: m.key.clone(),
                            id: m.id,
                        }
                    }
                }
            })
            .collect()
    }

    pub(crate) fn finish(&mut self, state: TransactionState) {
        self.state = state;
    }

    /// Returns the start version the first time it is called after the
    /// transaction ends, so the manager releases the snapshot once.
    pub(crate) fn take_snapshot(&mut self) -> Option<DataVersion> {
        std::mem::take(&mut self.snapshot_held).then_some(self.start_version)
    }

    pub(crate) fn savepoint(&self) -> Savepoint {
        Savepoint {
            changes: self.changes.len(),
            sequence: self.next_sequence,
            overlays: self.overlays.clone(),
        }
    }

    pub(crate) fn rollback_to(&mut self, savepoint: Savepoint) {
        self.changes.truncate(savepoint.changes);
        self.next_sequence = savepoint.sequence;
        self.overlays = savepoint.overlays;
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CoreError::illegal_state(format!("{} is {:?}", self.id, self.state)))
        }
    }

    fn track(&mut self, partition: &Arc<dyn Partition>) -> String {
        let id = partition.id();
        self.partitions.entry(id.clone()).or_insert_with(|| Arc::clone(partition));
        id
    }

    fn record(&mut self, key: ConflictKey) {
        if self.mode == TransactionMode::ReadWrite {
            self.read_set.insert(key);
        }
    }

    /// Entry `id` as this transaction sees it.
    pub(crate) fn entry(&mut self, partition: &Arc<dyn Partition>, id: EntryId) -> CoreResult<Option<Entry>> {
        self.ensure_active()?;
        let pid = self.track(partition);
        if let Some(local) = self.overlays.get(&pid).and_then(|o| o.entry(id)) {
            return Ok(local.cloned());
        }
        self.record(ConflictKey::Entry { partition: pid, id });
        Ok(partition.master_table()?.get(id, self.start_version))
    }

    /// Ids under `key` as this transaction sees them.
    pub(crate) fn forward(
        &mut self,
        partition: &Arc<dyn Partition>,
        index: &IndexId,
        key: &IndexKey,
    ) -> CoreResult<Vec<EntryId>> {
        self.ensure_active()?;
        let pid = self.track(partition);
        let mut ids = partition.index(index)?.forward_lookup(key, self.start_version);
        if let Some(overlay) = self.overlays.get(&pid) {
            overlay.adjust_forward(index, key, &mut ids);
        }
        self.record(ConflictKey::IndexKey {
            partition: pid,
            index: index.clone(),
            key: key.clone(),
        });
        Ok(ids)
    }

    /// Keys of `id` as this transaction sees them.
    pub(crate) fn reverse(
        &mut self,
        partition: &Arc<dyn Partition>,
        index: &IndexId,
        id: EntryId,
    ) -> CoreResult<Vec<IndexKey>> {
        self.ensure_active()?;
        let pid = self.track(partition);
        let mut keys = partition.index(index)?.reverse_lookup(id, self.start_version);
        if let Some(overlay) = self.overlays.get(&pid) {
            overlay.adjust_reverse(index, id, &mut keys);
        }
        self.record(ConflictKey::Reverse {
            partition: pid,
            index: index.clone(),
            id,
        });
        Ok(keys)
    }

    /// True if `(key, id)` is present as this transaction sees it.
    pub(crate) fn contains(
        &mut self,
        partition: &Arc<dyn Partition>,
        index: &IndexId,
        key: &IndexKey,
        id: EntryId,
    ) -> CoreResult<bool> {
        self.ensure_active()?;
        let pid = self.track(partition);
        if let Some(local) = self.overlays.get(&pid).and_then(|o| o.pair(index, key, id)) {
            return Ok(local);
        }
        self.record(ConflictKey::IndexPair {
            partition: pid,
            index: index.clone(),
            key: key.clone(),
            id,
        });
        Ok(partition.index(index)?.contains(key, id, self.start_version))
    }

    fn next_sequence(&mut self) -> EditSequence {
        let seq = EditSequence(self.next_sequence);
        self.next_sequence += 1;
        seq
    }

    /// Emits an entry edit.
    pub(crate) fn emit_entry(
        &mut self,
        partition: &Arc<dyn Partition>,
        id: EntryId,
        dn: Dn,
        change: EntryChange,
    ) -> CoreResult<()> {
        let sequence = self.next_sequence();
        self.emit(
            partition,
            LogEdit::Entry(EntryModification {
                sequence,
                id,
                dn,
                change,
            }),
        )
    }

    /// Emits an index edit.
    pub(crate) fn emit_index(
        &mut self,
        partition: &Arc<dyn Partition>,
        index: &IndexId,
        key: IndexKey,
        id: EntryId,
        change: IndexChange,
    ) -> CoreResult<()> {
        let sequence = self.next_sequence();
        self.emit(partition, LogEdit::Index(IndexModification::new(sequence, index, key, id, change)))
    }

    fn emit(&mut self, partition: &Arc<dyn Partition>, edit: LogEdit) -> CoreResult<()> {
        self.ensure_active()?;
        if self.mode == TransactionMode::ReadOnly {
            return Err(CoreError::illegal_state(format!("{} is read-only", self.id)));
        }
        let pid = self.track(partition);
        let active = edit.activate(partition.as_ref())?;
        let overlay = self.overlays.entry(pid).or_default();
        match &active {
            ActiveEdit::Entry(e) => overlay.put_entry(e.id, e.post_image().cloned()),
            ActiveEdit::Index(b) => {
                let m = b.modification();
                overlay.set_pair(b.index().id(), &m.key, m.id, m.change == IndexChange::Add);
            }
        }
        tracing::trace!(txid = %self.id, edit = %active.detach(), "edit emitted");
        self.changes.push(Change {
            partition: Arc::clone(partition),
            edit: active,
        });
        Ok(())
    }
}
