//! Partitions: one master table plus its indices under one suffix.
//!
//! [`Partition`] is capability-checked. A partition declares what it offers
//! through [`Capabilities`] and the default methods for anything it does
//! not offer return [`CoreError::NotImplemented`]. [`StorePartition`] is
//! the complete implementation backed by versioned in-memory stores.

mod factory;
pub mod failpoint;
mod lifecycle;
mod store;
mod verify;

pub use factory::{PartitionFactory, StorePartitionFactory};
pub use failpoint::Failpoints;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use store::{PartitionDump, StorePartition};
pub use verify::{verify, Inconsistency};

use crate::entry::{Entry, EntryId};
use crate::error::{CoreError, CoreResult};
use crate::index::{Index, IndexId, IndexUndo, SystemIndex};
use crate::logedit::ActiveEdit;
use crate::name::Dn;
use crate::schema::SchemaAuthority;
use crate::store::{MasterTable, Prior};
use crate::types::DataVersion;
use std::fmt;
use std::io;
use std::sync::Arc;

/// What a partition implementation supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Exposes its master table.
    pub master_table: bool,
    /// Exposes system and user indices.
    pub indices: bool,
    /// Accepts edits through [`Partition::apply`].
    pub apply: bool,
}

impl Capabilities {
    /// Nothing beyond identity and lifecycle.
    pub const NONE: Self = Self {
        master_table: false,
        indices: false,
        apply: false,
    };

    /// Everything.
    pub const FULL: Self = Self {
        master_table: true,
        indices: true,
        apply: true,
    };
}

/// Receipt of one applied edit, enough to undo it.
#[derive(Debug)]
pub enum AppliedEdit {
    /// A master-table write.
    Entry {
        /// Written row.
        id: EntryId,
        /// Version written at.
        version: DataVersion,
        /// What the row's slot held before.
        prior: Prior<Entry>,
    },
    /// An index write.
    Index {
        /// Written index.
        index: Arc<Index>,
        /// What the write overwrote.
        undo: IndexUndo,
    },
}

/// A storage partition.
pub trait Partition: Send + Sync + fmt::Debug {
    /// Partition id.
    fn id(&self) -> String;

    /// Suffix every entry of this partition lies under.
    fn suffix_dn(&self) -> Dn;

    /// Schema used to validate and normalize entries.
    fn schema(&self) -> Arc<dyn SchemaAuthority>;

    /// Brings the partition into service. Idempotent.
    ///
    /// # Errors
    ///
    /// Init failures, after cleanup has run.
    fn initialize(&self) -> CoreResult<()>;

    /// Takes the partition out of service.
    ///
    /// # Errors
    ///
    /// Teardown failures.
    fn destroy(&self) -> CoreResult<()>;

    /// True while serving.
    fn is_initialized(&self) -> bool;

    /// Sentinel parent of the context entry.
    fn root_id(&self) -> EntryId {
        EntryId::ROOT
    }

    /// Id of the context entry.
    fn default_id(&self) -> EntryId {
        EntryId::DEFAULT
    }

    /// Declared capabilities.
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// The master table.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotImplemented`] unless overridden.
    fn master_table(&self) -> CoreResult<Arc<MasterTable>> {
        Err(CoreError::not_implemented(format!("master table of {}", self.id())))
    }

    /// The index at `id`.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotImplemented`] unless overridden.
    fn index(&self, id: &IndexId) -> CoreResult<Arc<Index>> {
        Err(CoreError::not_implemented(format!("index {id} of {}", self.id())))
    }

    /// A system index.
    ///
    /// # Errors
    ///
    /// As [`index`](Self::index).
    fn system_index(&self, index: SystemIndex) -> CoreResult<Arc<Index>> {
        self.index(&IndexId::System(index))
    }

    /// The user index on `attribute` (name or OID).
    ///
    /// # Errors
    ///
    /// [`CoreError::IndexNotFound`] when the attribute is unknown or not
    /// indexed, or whatever [`index`](Self::index) returns.
    fn user_index(&self, attribute: &str) -> CoreResult<Arc<Index>> {
        let oid = self
            .schema()
            .attribute_type(attribute)
            .map(|at| at.oid.clone())
            .ok_or_else(|| CoreError::IndexNotFound {
                oid: attribute.to_string(),
            })?;
        self.index(&IndexId::User(oid))
    }

    /// Every user index.
    fn user_indices(&self) -> Vec<Arc<Index>> {
        Vec::new()
    }

    /// True if either a user or a system index covers `attribute`.
    fn has_index_on(&self, attribute: &str) -> bool {
        self.has_user_index_on(attribute) || self.has_system_index_on(attribute)
    }

    /// True if a user index covers `attribute`.
    fn has_user_index_on(&self, attribute: &str) -> bool {
        self.user_index(attribute).is_ok()
    }

    /// True if a system index is keyed by `attribute`'s values. Only the
    /// objectClass index qualifies.
    fn has_system_index_on(&self, attribute: &str) -> bool {
        let is_object_class = self
            .schema()
            .attribute_type(attribute)
            .is_some_and(|at| at.oid == SystemIndex::ObjectClass.oid());
        is_object_class && self.system_index(SystemIndex::ObjectClass).is_ok()
    }

    /// Writes `edit` at `version`.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotImplemented`] unless overridden.
    fn apply(&self, edit: &ActiveEdit, version: DataVersion) -> CoreResult<AppliedEdit> {
        let _ = (edit, version);
        Err(CoreError::not_implemented(format!("apply on {}", self.id())))
    }

    /// Undoes one [`apply`](Self::apply).
    ///
    /// # Errors
    ///
    /// Fails if the master table is not available.
    fn revert(&self, applied: AppliedEdit) -> CoreResult<()> {
        match applied {
            AppliedEdit::Entry { id, version, prior } => self.master_table()?.restore(id, version, prior),
            AppliedEdit::Index { index, undo } => index.undo(undo),
        }
        Ok(())
    }

    /// Drops history no snapshot at or above `horizon` can see. Returns the
    /// number of slots removed.
    fn prune(&self, horizon: DataVersion) -> usize {
        let _ = horizon;
        0
    }

    /// Human-readable dump of the index called `name`.
    ///
    /// # Errors
    ///
    /// Write failures.
    fn dump_index(&self, out: &mut dyn io::Write, name: &str) -> CoreResult<()> {
        writeln!(out, "Nothing to dump for index {name}").map_err(io_error)
    }
}

pub(crate) fn io_error(e: io::Error) -> CoreError {
    CoreError::Storage(ditstore_storage::StorageError::from(e))
}
