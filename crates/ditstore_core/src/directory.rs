//! Directory facade.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::name::Dn;
use crate::operation::OperationExecutionManager;
use crate::partition::{verify, Inconsistency, Partition};
use crate::recovery::{recover, RecoveryReport};
use crate::schema::SchemaAuthority;
use crate::txn::TransactionManager;
use crate::wal::DurableLog;
use ditstore_storage::{InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Entry point tying the log, the managers and the partitions together.
///
/// # Opening
///
/// ```rust,ignore
/// use ditstore_core::{Config, Directory, Schema, StorePartition, Dn};
/// use std::sync::Arc;
///
/// let schema = Arc::new(Schema::core());
/// let dir = Directory::open_in_memory(schema.clone(), Config::default());
/// let part = StorePartition::new(schema, "example", Dn::parse("dc=example,dc=com")?);
/// dir.add_partition(Arc::new(part))?;
/// dir.recover()?;
/// ```
///
/// Partitions are registered first and the log replayed into them after,
/// so `recover` must run before the first operation.
pub struct Directory {
    /// Schema shared by every partition.
    schema: Arc<dyn SchemaAuthority>,
    /// Transaction manager.
    transactions: Arc<TransactionManager>,
    /// Operation manager.
    operations: OperationExecutionManager,
    /// Partitions by id.
    partitions: RwLock<BTreeMap<String, Arc<dyn Partition>>>,
}

impl Directory {
    /// Opens a directory logging to `backend`.
    #[must_use]
    pub fn open(backend: Box<dyn StorageBackend>, schema: Arc<dyn SchemaAuthority>, config: Config) -> Self {
        let log = Arc::new(DurableLog::new(backend));
        let transactions = Arc::new(TransactionManager::new(log, config));
        Self {
            schema,
            operations: OperationExecutionManager::new(Arc::clone(&transactions)),
            transactions,
            partitions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Opens a directory with a volatile log.
    #[must_use]
    pub fn open_in_memory(schema: Arc<dyn SchemaAuthority>, config: Config) -> Self {
        Self::open(Box::new(InMemoryBackend::new()), schema, config)
    }

    /// Shared schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<dyn SchemaAuthority> {
        &self.schema
    }

    /// Transaction manager.
    #[must_use]
    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    /// Operation manager.
    #[must_use]
    pub fn operations(&self) -> &OperationExecutionManager {
        &self.operations
    }

    /// Registers and initializes `partition`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnwillingToPerform`] when the id is taken or the suffix
    /// overlaps another partition, and initialization failures.
    pub fn add_partition(&self, partition: Arc<dyn Partition>) -> CoreResult<()> {
        let id = partition.id();
        let suffix = partition.suffix_dn();
        if suffix.is_empty() {
            return Err(CoreError::unwilling(format!("partition {id} has an empty suffix")));
        }
        let mut partitions = self.partitions.write();
        if partitions.contains_key(&id) {
            return Err(CoreError::unwilling(format!("partition {id} is already registered")));
        }
        for other in partitions.values() {
            let theirs = other.suffix_dn();
            if suffix.is_descendant_or_self(&theirs) || theirs.is_descendant_of(&suffix) {
                return Err(CoreError::unwilling(format!(
                    "suffix {suffix} of {id} overlaps {theirs} of {}",
                    other.id()
                )));
            }
        }
        partition.initialize()?;
        tracing::info!(partition = %id, %suffix, "partition registered");
        partitions.insert(id, partition);
        Ok(())
    }

    /// Replays the log into the registered partitions and resumes the
    /// transaction manager from where the log ends.
    ///
    /// # Errors
    ///
    /// See [`recover`].
    pub fn recover(&self) -> CoreResult<RecoveryReport> {
        let partitions = self.partitions.read().clone();
        let report = recover(self.transactions.log(), &partitions)?;
        self.transactions.resume(report.version, report.next_txid);
        Ok(report)
    }

    /// Partition by id.
    #[must_use]
    pub fn partition(&self, id: &str) -> Option<Arc<dyn Partition>> {
        self.partitions.read().get(id).cloned()
    }

    /// Partition whose suffix holds `dn`.
    #[must_use]
    pub fn partition_for(&self, dn: &Dn) -> Option<Arc<dyn Partition>> {
        self.partitions
            .read()
            .values()
            .find(|p| dn.is_descendant_or_self(&p.suffix_dn()))
            .cloned()
    }

    /// Every registered partition, in id order.
    #[must_use]
    pub fn partitions(&self) -> Vec<Arc<dyn Partition>> {
        self.partitions.read().values().cloned().collect()
    }

    /// Checks the indices of partition `id` at the current version.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoSuchObject`] for an unknown id, and storage failures.
    pub fn verify(&self, id: &str) -> CoreResult<Vec<Inconsistency>> {
        let partition = self
            .partition(id)
            .ok_or_else(|| CoreError::no_such_object(format!("partition {id}")))?;
        verify(partition.as_ref(), self.transactions.logical_data_version())
    }

    /// Syncs the log and destroys every partition.
    ///
    /// # Errors
    ///
    /// The first sync or teardown failure. Remaining partitions are still
    /// destroyed.
    pub fn shutdown(&self) -> CoreResult<()> {
        let mut first = self.transactions.log().sync().err();
        for partition in self.partitions.read().values() {
            if let Err(e) = partition.destroy() {
                tracing::warn!(partition = %partition.id(), error = %e, "partition teardown failed");
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("partitions", &self.partitions.read().keys().collect::<Vec<_>>())
            .field("version", &self.transactions.logical_data_version())
            .finish_non_exhaustive()
    }
}
