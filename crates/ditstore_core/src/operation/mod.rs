//! Operation execution.
//!
//! Each operation runs inside the transaction bound to the calling thread.
//! When none is bound, one is created for the single operation and
//! committed or aborted before returning; a commit that hits a conflict is
//! retried from scratch up to [`Config::max_conflict_retries`] times.
//!
//! A failed operation inside an explicit transaction leaves that
//! transaction exactly as it was before the call.
//!
//! [`Config::max_conflict_retries`]: crate::Config::max_conflict_retries

mod alias;
mod context;
pub(crate) mod keys;
mod relocate;
mod schema_check;
mod session;
mod write;

pub use context::{
    AddContext, DeleteContext, LookupContext, ModifyContext, MoveAndRenameContext, MoveContext, RenameContext,
};

use crate::entry::{Entry, EntryId};
use crate::error::{CoreResult, ErrorKind};
use crate::name::Dn;
use crate::partition::Partition;
use crate::txn::{TransactionManager, TransactionMode};
use crate::types::OperationKind;
use relocate::Relocation;
use session::Session;
use std::sync::Arc;

/// Runs directory operations against partitions.
#[derive(Debug, Clone)]
pub struct OperationExecutionManager {
    transactions: Arc<TransactionManager>,
}

impl OperationExecutionManager {
    /// Creates a manager over `transactions`.
    #[must_use]
    pub fn new(transactions: Arc<TransactionManager>) -> Self {
        Self { transactions }
    }

    /// The transaction manager operations run under.
    #[must_use]
    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    /// Adds an entry and returns its new id.
    ///
    /// The parent must exist and must not be an alias. Rdn values missing
    /// from the entry are added to it. The context entry of a partition is
    /// added under the partition's default id.
    ///
    /// # Errors
    ///
    /// `EntryAlreadyExists`, `NoSuchObject` for a missing parent,
    /// `SchemaViolation`, `AliasDereferencing`, and storage failures.
    pub fn add(&self, partition: &Arc<dyn Partition>, ctx: &AddContext) -> CoreResult<EntryId> {
        self.execute(OperationKind::Add, ctx.entry.dn(), TransactionMode::ReadWrite, partition, |s| {
            write::add(s, ctx)
        })
    }

    /// Deletes a leaf entry.
    ///
    /// Aliases pointing at the entry stay behind, dangling.
    ///
    /// # Errors
    ///
    /// `NoSuchObject`, `ContextNotEmpty`, and storage failures.
    pub fn delete(&self, partition: &Arc<dyn Partition>, ctx: &DeleteContext) -> CoreResult<()> {
        self.execute(OperationKind::Delete, &ctx.dn, TransactionMode::ReadWrite, partition, |s| {
            write::delete(s, ctx)
        })
    }

    /// Applies ordered modifications and returns the modified entry.
    ///
    /// # Errors
    ///
    /// `NoSuchObject`, `NoSuchAttribute`, `AttributeOrValueExists`,
    /// `SchemaViolation`, `AliasDereferencing`, and storage failures.
    pub fn modify(&self, partition: &Arc<dyn Partition>, ctx: &ModifyContext) -> CoreResult<Entry> {
        self.execute(OperationKind::Modify, &ctx.dn, TransactionMode::ReadWrite, partition, |s| {
            write::modify(s, ctx)
        })
    }

    /// Changes the leaf Rdn and returns the renamed entry.
    ///
    /// # Errors
    ///
    /// `NoSuchObject`, `EntryAlreadyExists`, `SchemaViolation`,
    /// `UnwillingToPerform` for the context entry, and storage failures.
    pub fn rename(&self, partition: &Arc<dyn Partition>, ctx: &RenameContext) -> CoreResult<Entry> {
        let request = Relocation {
            dn: &ctx.dn,
            new_superior: None,
            new_rdn: Some(&ctx.new_rdn),
            delete_old_rdn: ctx.delete_old_rdn,
        };
        self.execute(OperationKind::Rename, &ctx.dn, TransactionMode::ReadWrite, partition, |s| {
            relocate::relocate(s, &request)
        })
    }

    /// Moves an entry with its subtree and returns the moved entry.
    ///
    /// # Errors
    ///
    /// `NoSuchObject`, `EntryAlreadyExists`, `AliasDereferencing` for an
    /// alias superior, `UnwillingToPerform` for a move below itself or a
    /// referral, and storage failures.
    pub fn move_entry(&self, partition: &Arc<dyn Partition>, ctx: &MoveContext) -> CoreResult<Entry> {
        let request = Relocation {
            dn: &ctx.dn,
            new_superior: Some(&ctx.new_superior),
            new_rdn: None,
            delete_old_rdn: false,
        };
        self.execute(OperationKind::Move, &ctx.dn, TransactionMode::ReadWrite, partition, |s| {
            relocate::relocate(s, &request)
        })
    }

    /// Moves and renames in one step.
    ///
    /// # Errors
    ///
    /// As [`rename`](Self::rename) and [`move_entry`](Self::move_entry).
    pub fn move_and_rename(&self, partition: &Arc<dyn Partition>, ctx: &MoveAndRenameContext) -> CoreResult<Entry> {
        let request = Relocation {
            dn: &ctx.dn,
            new_superior: Some(&ctx.new_superior),
            new_rdn: Some(&ctx.new_rdn),
            delete_old_rdn: ctx.delete_old_rdn,
        };
        self.execute(OperationKind::MoveAndRename, &ctx.dn, TransactionMode::ReadWrite, partition, |s| {
            relocate::relocate(s, &request)
        })
    }

    /// Reads an entry, restricted to the requested attributes.
    ///
    /// # Errors
    ///
    /// `NoSuchObject` and storage failures.
    pub fn lookup(&self, partition: &Arc<dyn Partition>, ctx: &LookupContext) -> CoreResult<Entry> {
        self.execute(OperationKind::Lookup, &ctx.dn, TransactionMode::ReadOnly, partition, |s| {
            let (_, entry) = s.require(&ctx.dn)?;
            Ok(entry.project(&ctx.attributes))
        })
    }

    /// Reads an entry by id.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn lookup_by_id(&self, partition: &Arc<dyn Partition>, id: EntryId) -> CoreResult<Option<Entry>> {
        self.execute(OperationKind::Lookup, id, TransactionMode::ReadOnly, partition, |s| s.entry(id))
    }

    /// True if `dn` names an entry.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn has_entry(&self, partition: &Arc<dyn Partition>, dn: &Dn) -> CoreResult<bool> {
        self.execute(OperationKind::Lookup, dn, TransactionMode::ReadOnly, partition, |s| {
            Ok(s.resolve(dn)?.is_some())
        })
    }

    fn execute<T, F>(
        &self,
        op: OperationKind,
        target: impl std::fmt::Display,
        mode: TransactionMode,
        partition: &Arc<dyn Partition>,
        mut body: F,
    ) -> CoreResult<T>
    where
        F: FnMut(&mut Session<'_>) -> CoreResult<T>,
    {
        let target = target.to_string();
        tracing::debug!(%op, %target, partition = %partition.id(), "operation");
        let mut retries = 0;
        loop {
            let current = self
                .transactions
                .current_transaction(mode)
                .map_err(|e| e.during(op, &target))?;
            let result = {
                let mut txn = current.handle.lock();
                let savepoint = (!current.implicit).then(|| txn.savepoint());
                let result = Session::new(&mut txn, partition).and_then(|mut s| body(&mut s));
                if let (Err(_), Some(savepoint)) = (&result, savepoint) {
                    if txn.is_active() {
                        txn.rollback_to(savepoint);
                    }
                }
                result
            };
            if !current.implicit {
                return result.map_err(|e| e.during(op, &target));
            }
            let value = match result {
                Ok(value) => value,
                Err(e) => {
                    self.transactions.abort(&current.handle)?;
                    return Err(e.during(op, &target));
                }
            };
            match self.transactions.commit(&current.handle) {
                Ok(_) => return Ok(value),
                Err(e)
                    if e.kind() == ErrorKind::ConcurrencyConflict
                        && retries < self.transactions.config().max_conflict_retries =>
                {
                    retries += 1;
                    tracing::debug!(%op, %target, retries, error = %e, "retrying after conflict");
                }
                Err(e) => return Err(e.during(op, &target)),
            }
        }
    }
}
