//! Log edits: the elementary data changes an operation emits.
//!
//! An edit exists in two forms. [`LogEdit`] is the wire form: plain data,
//! serializable, naming its index only by OID and system flag.
//! [`ActiveEdit`] is the live form the transaction applies: index edits hold
//! an `Arc` to the [`Index`] they target. [`LogEdit::activate`] turns the
//! first into the second against a partition; [`ActiveEdit::detach`] goes
//! back. Nothing rebinds implicitly.
//!
//! Edits are never mutated after creation. Undo is expressed by
//! [`LogEdit::inverse`].

use crate::entry::{Entry, EntryId, Modification};
use crate::error::{CoreError, CoreResult};
use crate::index::{Index, IndexId, IndexKey};
use crate::name::Dn;
use crate::partition::Partition;
use crate::types::EditSequence;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Operation kind of an [`EntryModification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryOperation {
    /// New entry.
    Add,
    /// Removed entry.
    Delete,
    /// Changed content or name.
    Modify,
}

/// Content of an entry change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryChange {
    /// The entry as added.
    Add {
        /// Added entry.
        entry: Entry,
    },
    /// The entry as it was just before deletion.
    Delete {
        /// Deleted entry.
        entry: Entry,
    },
    /// Ordered attribute deltas with full images on both sides. A Dn-only
    /// change has no deltas.
    Modify {
        /// Attribute deltas in request order.
        deltas: Vec<Modification>,
        /// Entry before.
        before: Entry,
        /// Entry after.
        after: Entry,
    },
}

/// Change of one master-table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryModification {
    /// Creation-time position.
    pub sequence: EditSequence,
    /// Target entry.
    pub id: EntryId,
    /// Affected Dn (the post-change name for a modify).
    pub dn: Dn,
    /// What changed.
    pub change: EntryChange,
}

impl EntryModification {
    /// Operation kind.
    #[must_use]
    pub fn operation(&self) -> EntryOperation {
        match self.change {
            EntryChange::Add { .. } => EntryOperation::Add,
            EntryChange::Delete { .. } => EntryOperation::Delete,
            EntryChange::Modify { .. } => EntryOperation::Modify,
        }
    }

    /// Row content once the edit is applied (`None` after a delete).
    #[must_use]
    pub fn post_image(&self) -> Option<&Entry> {
        match &self.change {
            EntryChange::Add { entry } => Some(entry),
            EntryChange::Delete { .. } => None,
            EntryChange::Modify { after, .. } => Some(after),
        }
    }

    /// Edit that undoes this one. A modify inverse carries swapped images
    /// and no deltas.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let (dn, change) = match &self.change {
            EntryChange::Add { entry } => (entry.dn().clone(), EntryChange::Delete { entry: entry.clone() }),
            EntryChange::Delete { entry } => (entry.dn().clone(), EntryChange::Add { entry: entry.clone() }),
            EntryChange::Modify { before, after, .. } => (
                before.dn().clone(),
                EntryChange::Modify {
                    deltas: Vec::new(),
                    before: after.clone(),
                    after: before.clone(),
                },
            ),
        };
        Self {
            sequence: self.sequence,
            id: self.id,
            dn,
            change,
        }
    }
}

/// Direction of an index change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexChange {
    /// Insert the pair.
    Add,
    /// Remove the pair.
    Delete,
}

impl IndexChange {
    /// The other direction.
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Add => Self::Delete,
            Self::Delete => Self::Add,
        }
    }
}

/// Change of one `(key, id)` pair of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModification {
    /// Creation-time position.
    pub sequence: EditSequence,
    /// OID of the attribute or system index.
    pub oid: String,
    /// Normalized key.
    pub key: IndexKey,
    /// Affected entry.
    pub id: EntryId,
    /// Direction.
    pub change: IndexChange,
    /// System or user index.
    pub system: bool,
}

impl IndexModification {
    /// Index edit for `index`.
    #[must_use]
    pub fn new(sequence: EditSequence, index: &IndexId, key: IndexKey, id: EntryId, change: IndexChange) -> Self {
        Self {
            sequence,
            oid: index.oid().to_string(),
            key,
            id,
            change,
            system: index.is_system(),
        }
    }

    /// Index address reconstructed from the tag.
    #[must_use]
    pub fn index_id(&self) -> Option<IndexId> {
        IndexId::from_tag(&self.oid, self.system)
    }

    /// Edit that undoes this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            change: self.change.flip(),
            ..self.clone()
        }
    }
}

/// Wire form of a log edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEdit {
    /// Master-table change.
    Entry(EntryModification),
    /// Index change.
    Index(IndexModification),
}

impl LogEdit {
    /// Creation-time position.
    #[must_use]
    pub fn sequence(&self) -> EditSequence {
        match self {
            Self::Entry(e) => e.sequence,
            Self::Index(i) => i.sequence,
        }
    }

    /// Edit that undoes this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::Entry(e) => Self::Entry(e.inverse()),
            Self::Index(i) => Self::Index(i.inverse()),
        }
    }

    /// CBOR encoding.
    ///
    /// # Errors
    ///
    /// [`CoreError::Encoding`] if serialization fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out).map_err(|e| CoreError::encoding(e.to_string()))?;
        Ok(out)
    }

    /// Decodes [`encode`](Self::encode) output.
    ///
    /// # Errors
    ///
    /// [`CoreError::Encoding`] if the bytes are not a valid edit.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::encoding(e.to_string()))
    }

    /// Binds the edit to the live indices of `partition`.
    ///
    /// # Errors
    ///
    /// [`CoreError::LogCorruption`] for an unknown system index tag, and
    /// whatever [`Partition::index`] returns for a missing index
    /// ([`CoreError::IndexNotFound`] for user indices).
    pub fn activate(self, partition: &dyn Partition) -> CoreResult<ActiveEdit> {
        match self {
            Self::Entry(e) => Ok(ActiveEdit::Entry(e)),
            Self::Index(modification) => {
                let id = modification.index_id().ok_or_else(|| {
                    CoreError::log_corruption(format!("unknown system index {}", modification.oid))
                })?;
                let index = partition.index(&id)?;
                BoundIndexModification::bind(modification, index).map(ActiveEdit::Index)
            }
        }
    }
}

impl fmt::Display for LogEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry(e) => write!(f, "{} entry {:?} {} ({})", e.sequence, e.operation(), e.dn, e.id),
            Self::Index(i) => write!(
                f,
                "{} index {} {:?} {} -> {}",
                i.sequence,
                i.oid,
                i.change,
                i.key,
                i.id
            ),
        }
    }
}

/// Index edit bound to its live index.
#[derive(Debug, Clone)]
pub struct BoundIndexModification {
    modification: IndexModification,
    index: Arc<Index>,
}

impl BoundIndexModification {
    /// Binds `modification` to `index`.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] when the index is not the one the edit is
    /// tagged with.
    pub fn bind(modification: IndexModification, index: Arc<Index>) -> CoreResult<Self> {
        if index.id().oid() != modification.oid || index.id().is_system() != modification.system {
            return Err(CoreError::illegal_state(format!(
                "edit for {} cannot bind to index {}",
                modification.oid,
                index.id()
            )));
        }
        Ok(Self { modification, index })
    }

    /// The wire-form part.
    #[must_use]
    pub fn modification(&self) -> &IndexModification {
        &self.modification
    }

    /// The live index.
    #[must_use]
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }
}

/// Live form of a log edit.
#[derive(Debug, Clone)]
pub enum ActiveEdit {
    /// Master-table change.
    Entry(EntryModification),
    /// Index change bound to its index.
    Index(BoundIndexModification),
}

impl ActiveEdit {
    /// Wire form.
    #[must_use]
    pub fn detach(&self) -> LogEdit {
        match self {
            Self::Entry(e) => LogEdit::Entry(e.clone()),
            Self::Index(b) => LogEdit::Index(b.modification.clone()),
        }
    }

    /// Creation-time position.
    #[must_use]
    pub fn sequence(&self) -> EditSequence {
        match self {
            Self::Entry(e) => e.sequence,
            Self::Index(b) => b.modification.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ParentIdAndRdn, SystemIndex};

    fn entry() -> Entry {
        Entry::new(Dn::parse("cn=x,dc=test").unwrap())
            .with("cn", ["x"])
            .with("sn", ["x"])
    }

    #[test]
    fn entry_edit_survives_encoding() {
        let edit = LogEdit::Entry(EntryModification {
            sequence: EditSequence(4),
            id: EntryId::new(),
            dn: entry().dn().clone(),
            change: EntryChange::Modify {
                deltas: vec![Modification::replace("sn", ["y"])],
                before: entry(),
                after: entry().with("description", ["d"]),
            },
        });
        let bytes = edit.encode().unwrap();
        assert_eq!(LogEdit::decode(&bytes).unwrap(), edit);
    }

    #[test]
    fn index_edit_survives_encoding() {
        let edit = LogEdit::Index(IndexModification::new(
            EditSequence(9),
            &IndexId::System(SystemIndex::Rdn),
            IndexKey::ParentRdn(ParentIdAndRdn::new(EntryId::DEFAULT, "cn=x")),
            EntryId::new(),
            IndexChange::Add,
        ));
        assert_eq!(LogEdit::decode(&edit.encode().unwrap()).unwrap(), edit);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            LogEdit::decode(&[0xff, 0x00, 0x13]),
            Err(CoreError::Encoding { .. })
        ));
    }

    #[test]
    fn inverses_cancel() {
        let add = EntryModification {
            sequence: EditSequence(1),
            id: EntryId::new(),
            dn: entry().dn().clone(),
            change: EntryChange::Add { entry: entry() },
        };
        assert_eq!(add.inverse().operation(), EntryOperation::Delete);
        assert_eq!(add.inverse().inverse(), add);
        assert!(add.inverse().post_image().is_none());

        let idx = IndexModification::new(
            EditSequence(2),
            &IndexId::User("2.5.4.3".into()),
            IndexKey::value("x"),
            add.id,
            IndexChange::Add,
        );
        assert_eq!(idx.inverse().change, IndexChange::Delete);
        assert_eq!(idx.inverse().inverse(), idx);
    }

    #[test]
    fn bind_checks_the_tag() {
        let edit = IndexModification::new(
            EditSequence(1),
            &IndexId::User("2.5.4.3".into()),
            IndexKey::value("x"),
            EntryId::new(),
            IndexChange::Add,
        );
        let wrong = Arc::new(Index::new(IndexId::User("2.5.4.4".into()), "sn", 0));
        assert!(BoundIndexModification::bind(edit.clone(), wrong).is_err());
        let right = Arc::new(Index::new(IndexId::User("2.5.4.3".into()), "cn", 0));
        let bound = BoundIndexModification::bind(edit.clone(), Arc::clone(&right)).unwrap();
        assert!(Arc::ptr_eq(bound.index(), &right));
        assert_eq!(ActiveEdit::Index(bound).detach(), LogEdit::Index(edit));
    }
}
