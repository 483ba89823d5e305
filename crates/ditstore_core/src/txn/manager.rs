//! Transaction manager.

use super::conflict::ConflictKey;
use super::transaction::{Transaction, TransactionMode, TransactionState};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::partition::{AppliedEdit, Partition};
use crate::types::{DataVersion, TransactionId};
use crate::wal::{DurableLog, LogRecord};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Shared handle to a transaction.
pub type TransactionHandle = Arc<Mutex<Transaction>>;

/// The transaction bound to the calling thread.
#[derive(Debug, Clone)]
pub struct CurrentTransaction {
    /// The transaction.
    pub handle: TransactionHandle,
    /// True when this call created it; the caller then owns termination.
    pub implicit: bool,
}

/// Proof that the commit lock is held.
///
/// Publishing a new logical data version requires one, so the version can
/// only move while commits are serialized.
#[must_use = "the commit lock is released when the guard is dropped"]
pub struct CommitGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    owner: &'a TransactionManager,
}

impl std::fmt::Debug for CommitGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitGuard").finish_non_exhaustive()
    }
}

/// Creates, binds and terminates transactions.
///
/// ## Isolation
///
/// Every transaction reads at the logical data version current when it
/// started. Commits write at the next version and publish it only after
/// every edit has been applied, so readers never observe half a commit.
///
/// ## Conflicts
///
/// Write transactions proceed optimistically. At commit, under the commit
/// lock, every key the transaction read or wrote is checked for a newer
/// committed write; the first one found aborts the commit with
/// [`CoreError::ConcurrencyConflict`].
pub struct TransactionManager {
    /// Durable log commits are written to.
    log: Arc<DurableLog>,
    /// Engine settings.
    config: Config,
    /// Next transaction id.
    next_txid: AtomicU64,
    /// Published logical data version.
    version: AtomicU64,
    /// Serializes commits.
    commit_lock: Mutex<()>,
    /// Transaction bound to each thread.
    bindings: Mutex<HashMap<ThreadId, TransactionHandle>>,
    /// Start versions of live transactions with their counts.
    snapshots: Mutex<BTreeMap<DataVersion, usize>>,
    /// Set once the log tail is no longer known to match storage.
    poisoned: AtomicBool,
}

impl TransactionManager {
    /// Creates a manager starting at [`DataVersion::INITIAL`].
    pub fn new(log: Arc<DurableLog>, config: Config) -> Self {
        Self {
            log,
            config,
            next_txid: AtomicU64::new(1),
            version: AtomicU64::new(DataVersion::INITIAL.as_u64()),
            commit_lock: Mutex::new(()),
            bindings: Mutex::new(HashMap::new()),
            snapshots: Mutex::new(BTreeMap::new()),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Continues from recovered counters.
    pub fn resume(&self, version: DataVersion, next_txid: TransactionId) {
        self.version.store(version.as_u64(), Ordering::SeqCst);
        self.next_txid.store(next_txid.as_u64(), Ordering::SeqCst);
    }

    /// The durable log.
    #[must_use]
    pub fn log(&self) -> &Arc<DurableLog> {
        &self.log
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Latest published version.
    #[must_use]
    pub fn logical_data_version(&self) -> DataVersion {
        DataVersion::new(self.version.load(Ordering::SeqCst))
    }

    /// Oldest start version of any live transaction.
    #[must_use]
    pub fn oldest_snapshot(&self) -> Option<DataVersion> {
        self.snapshots.lock().keys().next().copied()
    }

    /// True after a log failure left the log tail unresolved. Write commits
    /// are refused until the directory is reopened and recovered.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Number of live transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.snapshots.lock().values().sum()
    }

    /// Takes the commit lock.
    pub fn lock_commit(&self) -> CommitGuard<'_> {
        CommitGuard {
            _lock: self.commit_lock.lock(),
            owner: self,
        }
    }

    /// Publishes the next logical data version.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] for a guard taken from another manager.
    pub fn bump_logical_data_version(&self, guard: &CommitGuard<'_>) -> CoreResult<DataVersion> {
        if !std::ptr::eq(guard.owner, self) {
            return Err(CoreError::illegal_state("commit guard belongs to another manager"));
        }
        Ok(DataVersion::new(self.version.fetch_add(1, Ordering::SeqCst) + 1))
    }

    /// The transaction bound to this thread, if any.
    #[must_use]
    pub fn current(&self) -> Option<TransactionHandle> {
        self.bindings.lock().get(&thread::current().id()).cloned()
    }

    /// The bound transaction, or a new one bound now.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] when a write is requested while a
    /// read-only transaction is bound.
    pub fn current_transaction(&self, mode: TransactionMode) -> CoreResult<CurrentTransaction> {
        if let Some(handle) = self.current() {
            let bound_mode = handle.lock().mode();
            if mode == TransactionMode::ReadWrite && bound_mode == TransactionMode::ReadOnly {
                return Err(CoreError::illegal_state(
                    "write requested inside a read-only transaction",
                ));
            }
            return Ok(CurrentTransaction {
                handle,
                implicit: false,
            });
        }
        Ok(CurrentTransaction {
            handle: self.start(mode),
            implicit: true,
        })
    }

    /// Starts and binds a read-only transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] if one is already bound.
    pub fn begin_read(&self) -> CoreResult<TransactionHandle> {
        self.begin(TransactionMode::ReadOnly)
    }

    /// Starts and binds a read-write transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] if one is already bound.
    pub fn begin_write(&self) -> CoreResult<TransactionHandle> {
        self.begin(TransactionMode::ReadWrite)
    }

    fn begin(&self, mode: TransactionMode) -> CoreResult<TransactionHandle> {
        if let Some(bound) = self.current() {
            return Err(CoreError::illegal_state(format!(
                "{} already bound to this thread",
                bound.lock().id()
            )));
        }
        Ok(self.start(mode))
    }

    fn start(&self, mode: TransactionMode) -> TransactionHandle {
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        let start = {
            let mut snapshots = self.snapshots.lock();
            let start = self.logical_data_version();
            *snapshots.entry(start).or_insert(0) += 1;
            start
        };
        let thread = thread::current().id();
        let handle = Arc::new(Mutex::new(Transaction::new(txid, mode, start, thread)));
        self.bindings.lock().insert(thread, Arc::clone(&handle));
        tracing::debug!(%txid, ?mode, %start, "transaction started");
        handle
    }

    fn release(&self, txn: &mut Transaction, handle: &TransactionHandle) {
        {
            let mut bindings = self.bindings.lock();
            if bindings.get(&txn.thread()).is_some_and(|bound| Arc::ptr_eq(bound, handle)) {
                bindings.remove(&txn.thread());
            }
        }
        if let Some(start) = txn.take_snapshot() {
            let mut snapshots = self.snapshots.lock();
            if let Some(count) = snapshots.get_mut(&start) {
                *count -= 1;
                if *count == 0 {
                    snapshots.remove(&start);
                }
            }
        }
    }

    /// Commits `handle`, returning the version its changes are visible at.
    ///
    /// A read-only or empty transaction commits without publishing a new
    /// version. A failed commit leaves nothing applied and the transaction
    /// aborted.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] for a finished transaction,
    /// [`CoreError::ConcurrencyConflict`], and log or storage failures.
    pub fn commit(&self, handle: &TransactionHandle) -> CoreResult<DataVersion> {
        let mut txn = handle.lock();
        if !txn.is_active() {
            return Err(CoreError::illegal_state(format!("{} is {:?}", txn.id(), txn.state())));
        }
        let writes = txn.change_count() > 0;
        let outcome = if writes {
            self.commit_changes(&txn)
        } else {
            Ok(self.logical_data_version())
        };
        txn.finish(match outcome {
            Ok(_) => TransactionState::Committed,
            Err(_) => TransactionState::Aborted,
        });
        self.release(&mut txn, handle);
        if writes && outcome.is_ok() && self.config.prune_on_commit {
            let partitions: Vec<_> = txn.partitions().cloned().collect();
            drop(txn);
            self.prune(&partitions);
        }
        outcome
    }

    /// Abandons `handle`. Nothing it emitted reaches storage.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] for a finished transaction.
    pub fn abort(&self, handle: &TransactionHandle) -> CoreResult<()> {
        let mut txn = handle.lock();
        if !txn.is_active() {
            return Err(CoreError::illegal_state(format!("{} is {:?}", txn.id(), txn.state())));
        }
        txn.finish(TransactionState::Aborted);
        self.release(&mut txn, handle);
        tracing::debug!(txid = %txn.id(), discarded = txn.change_count(), "transaction aborted");
        Ok(())
    }

    /// Commits the bound transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] if none is bound, otherwise as
    /// [`commit`](Self::commit).
    pub fn commit_current(&self) -> CoreResult<DataVersion> {
        let handle = self
            .current()
            .ok_or_else(|| CoreError::illegal_state("no transaction bound to this thread"))?;
        self.commit(&handle)
    }

    /// Aborts the bound transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] if none is bound.
    pub fn abort_current(&self) -> CoreResult<()> {
        let handle = self
            .current()
            .ok_or_else(|| CoreError::illegal_state("no transaction bound to this thread"))?;
        self.abort(&handle)
    }

    fn check_conflicts(&self, txn: &Transaction) -> CoreResult<()> {
        let writes = txn.write_set();
        for key in txn.read_set().iter().chain(&writes) {
            let Some(partition) = txn.partition(key.partition()) else {
                continue;
            };
            if key
                .latest_version(partition.as_ref())?
                .is_some_and(|latest| latest > txn.start_version())
            {
                return Err(conflict(txn, key));
            }
        }
        Ok(())
    }

    fn commit_changes(&self, txn: &Transaction) -> CoreResult<DataVersion> {
        let guard = self.lock_commit();
        let txid = txn.id();
        if self.is_poisoned() {
            return Err(CoreError::illegal_state(format!(
                "{txid} refused: an earlier log failure must be recovered by reopening"
            )));
        }
        self.check_conflicts(txn)?;
        let version = self.logical_data_version().next();

        let mut records = Vec::with_capacity(txn.change_count() + 2);
        records.push(LogRecord::Begin { txid });
        records.extend(txn.pending().iter().map(|change| LogRecord::Edit {
            txid,
            partition: change.partition.id(),
            edit: change.edit.detach(),
        }));
        records.push(LogRecord::Commit { txid, version });
        if let Err(e) = self.log.append_all(&records) {
            // A partial append may have left a torn record at the tail.
            self.poison(txid, &e);
            return Err(e);
        }
        if let Err(e) = self.make_durable() {
            return Err(self.log_abort(txid, e));
        }

        let mut applied: Vec<(&Arc<dyn Partition>, AppliedEdit)> = Vec::with_capacity(txn.change_count());
        for change in txn.pending() {
            match change.partition.apply(&change.edit, version) {
                Ok(receipt) => applied.push((&change.partition, receipt)),
                Err(e) => {
                    tracing::warn!(%txid, error = %e, undone = applied.len(), "apply failed, rolling back");
                    for (partition, receipt) in applied.into_iter().rev() {
                        if let Err(undo) = partition.revert(receipt) {
                            tracing::warn!(%txid, error = %undo, "revert failed");
                        }
                    }
                    return Err(self.log_abort(txid, e));
                }
            }
        }

        let published = self.bump_logical_data_version(&guard)?;
        tracing::debug!(%txid, version = %published, edits = txn.change_count(), "transaction committed");
        Ok(published)
    }

    fn make_durable(&self) -> CoreResult<()> {
        self.log.flush()?;
        if self.config.sync_on_commit {
            self.log.sync()?;
        }
        Ok(())
    }

    /// Logs an abort for `txid` after `cause` stopped its commit and returns
    /// the error to surface. If the abort cannot be made durable the commit
    /// record may still be replayed, so the manager is poisoned and the
    /// outcome reported as indeterminate.
    fn log_abort(&self, txid: TransactionId, cause: CoreError) -> CoreError {
        let result = self
            .log
            .append(&LogRecord::Abort { txid })
            .and_then(|_| self.make_durable());
        match result {
            Ok(()) => cause,
            Err(e) => {
                self.poison(txid, &e);
                CoreError::CommitIndeterminate {
                    txid: txid.to_string(),
                    source: Box::new(cause),
                }
            }
        }
    }

    fn poison(&self, txid: TransactionId, error: &CoreError) {
        tracing::error!(%txid, %error, "log tail unresolved, refusing further commits");
        self.poisoned.store(true, Ordering::SeqCst);
    }

    fn prune(&self, partitions: &[Arc<dyn Partition>]) {
        let _guard = self.lock_commit();
        let horizon = {
            let snapshots = self.snapshots.lock();
            let current = self.logical_data_version();
            snapshots.keys().next().copied().map_or(current, |oldest| oldest.min(current))
        };
        let removed: usize = partitions.iter().map(|p| p.prune(horizon)).sum();
        if removed > 0 {
            tracing::trace!(%horizon, removed, "pruned versions");
        }
    }
}

fn conflict(txn: &Transaction, key: &ConflictKey) -> CoreError {
    CoreError::ConcurrencyConflict {
        txid: txn.id().to_string(),
        key: key.to_string(),
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("version", &self.logical_data_version())
            .field("next_txid", &self.next_txid.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, EntryId};
    use crate::index::{IndexKey, SystemIndex};
    use crate::logedit::{EntryChange, IndexChange};
    use crate::name::Dn;
    use crate::partition::StorePartition;
    use crate::schema::Schema;
    use ditstore_storage::InMemoryBackend;

    fn setup() -> (TransactionManager, Arc<dyn Partition>) {
        let log = Arc::new(DurableLog::new(Box::new(InMemoryBackend::new())));
        let p = StorePartition::new(Arc::new(Schema::core()), "test", Dn::parse("dc=test").unwrap());
        p.initialize().unwrap();
        (TransactionManager::new(log, Config::default()), Arc::new(p))
    }

    fn add_entry(t: &mut Transaction, p: &Arc<dyn Partition>, id: EntryId) {
        let entry = Entry::new(Dn::parse("cn=x,dc=test").unwrap()).with("cn", ["x"]);
        t.emit_entry(p, id, entry.dn().clone(), EntryChange::Add { entry })
            .unwrap();
    }

    #[test]
    fn commit_publishes_one_version() {
        let (tm, p) = setup();
        let handle = tm.begin_write().unwrap();
        let id = EntryId::new();
        add_entry(&mut handle.lock(), &p, id);
        let version = tm.commit(&handle).unwrap();
        assert_eq!(version, DataVersion::new(1));
        assert_eq!(tm.logical_data_version(), version);
        assert!(p.master_table().unwrap().get(id, version).is_some());
        assert!(tm.current().is_none());
        assert_eq!(tm.active_count(), 0);

        let records = tm.log().read_all().unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn empty_and_read_only_commits_do_not_bump() {
        let (tm, _) = setup();
        let w = tm.begin_write().unwrap();
        assert_eq!(tm.commit(&w).unwrap(), DataVersion::INITIAL);
        let r = tm.begin_read().unwrap();
        assert_eq!(tm.commit(&r).unwrap(), DataVersion::INITIAL);
        assert!(tm.log().read_all().unwrap().is_empty());
    }

    #[test]
    fn terminating_twice_is_illegal() {
        let (tm, _) = setup();
        let handle = tm.begin_write().unwrap();
        tm.abort(&handle).unwrap();
        assert!(matches!(tm.commit(&handle), Err(CoreError::IllegalState { .. })));
        assert!(matches!(tm.abort(&handle), Err(CoreError::IllegalState { .. })));
        assert!(matches!(tm.commit_current(), Err(CoreError::IllegalState { .. })));
    }

    #[test]
    fn binding_rules() {
        let (tm, _) = setup();
        let first = tm.current_transaction(TransactionMode::ReadOnly).unwrap();
        assert!(first.implicit);
        let again = tm.current_transaction(TransactionMode::ReadOnly).unwrap();
        assert!(!again.implicit);
        assert!(Arc::ptr_eq(&first.handle, &again.handle));
        assert!(matches!(
            tm.current_transaction(TransactionMode::ReadWrite),
            Err(CoreError::IllegalState { .. })
        ));
        assert!(tm.begin_write().is_err());
        tm.abort_current().unwrap();
        assert!(tm.begin_write().is_ok());
    }

    #[test]
    fn stale_read_conflicts_at_commit() {
        let (tm, p) = setup();
        let key = IndexKey::Id(EntryId::DEFAULT);
        let index = SystemIndex::OneLevel.into();

        let reader = tm.begin_write().unwrap();
        reader.lock().forward(&p, &index, &key).unwrap();
        add_entry(&mut reader.lock(), &p, EntryId::new());

        let writer = thread::scope(|s| {
            s.spawn(|| {
                let handle = tm.begin_write().unwrap();
                handle
                    .lock()
                    .emit_index(&p, &index, key.clone(), EntryId::new(), IndexChange::Add)
                    .unwrap();
                tm.commit(&handle)
            })
            .join()
            .unwrap()
        });
        assert!(writer.is_ok());

        let err = tm.commit(&reader).unwrap_err();
        assert!(matches!(err, CoreError::ConcurrencyConflict { .. }));
        assert_eq!(reader.lock().state(), TransactionState::Aborted);
    }

    #[test]
    fn disjoint_writes_do_not_conflict() {
        let (tm, p) = setup();
        let index = SystemIndex::OneLevel.into();
        let key = IndexKey::Id(EntryId::DEFAULT);
        let mine = tm.begin_write().unwrap();
        mine.lock()
            .emit_index(&p, &index, key.clone(), EntryId::new(), IndexChange::Add)
            .unwrap();
        thread::scope(|s| {
            s.spawn(|| {
                let other = tm.begin_write().unwrap();
                other
                    .lock()
                    .emit_index(&p, &index, key.clone(), EntryId::new(), IndexChange::Add)
                    .unwrap();
                tm.commit(&other).unwrap();
            });
        });
        assert_eq!(tm.commit(&mine).unwrap(), DataVersion::new(2));
    }

    #[test]
    fn failed_apply_leaves_storage_untouched() {
        let log = Arc::new(DurableLog::new(Box::new(InMemoryBackend::new())));
        let store = Arc::new(StorePartition::new(
            Arc::new(Schema::core()),
            "test",
            Dn::parse("dc=test").unwrap(),
        ));
        store.initialize().unwrap();
        let p: Arc<dyn Partition> = store.clone();
        let tm = TransactionManager::new(log, Config::default());
        let before = store.dump().unwrap();

        let handle = tm.begin_write().unwrap();
        add_entry(&mut handle.lock(), &p, EntryId::new());
        handle
            .lock()
            .emit_index(
                &p,
                &SystemIndex::Presence.into(),
                IndexKey::value("2.5.4.3"),
                EntryId::new(),
                IndexChange::Add,
            )
            .unwrap();
        store.failpoints().fail_apply_after(1);
        assert!(matches!(tm.commit(&handle), Err(CoreError::StorageFailure { .. })));
        assert_eq!(store.dump().unwrap(), before);
        assert_eq!(tm.logical_data_version(), DataVersion::INITIAL);

        let last = tm.log().read_all().unwrap().pop().unwrap().1;
        assert!(matches!(last, LogRecord::Abort { .. }));
    }

    #[test]
    fn guard_from_other_manager_rejected() {
        let (a, _) = setup();
        let (b, _) = setup();
        let guard = a.lock_commit();
        assert!(b.bump_logical_data_version(&guard).is_err());
        assert_eq!(a.bump_logical_data_version(&guard).unwrap(), DataVersion::new(1));
    }
}
