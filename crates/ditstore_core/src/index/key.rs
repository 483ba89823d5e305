use crate::entry::EntryId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an entry in the tree: its parent and its normalized Rdn.
///
/// For a partition's context entry the parent is [`EntryId::ROOT`] and the
/// Rdn component is the whole normalized suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParentIdAndRdn {
    /// Parent id.
    pub parent: EntryId,
    /// Normalized Rdn text.
    pub rdn: String,
}

impl ParentIdAndRdn {
    /// Creates a structural key.
    pub fn new(parent: EntryId, rdn: impl Into<String>) -> Self {
        Self {
            parent,
            rdn: rdn.into(),
        }
    }
}

impl fmt::Display for ParentIdAndRdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent, self.rdn)
    }
}

/// Key of an index slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    /// Normalized attribute value, or an OID for presence and objectClass.
    Value(String),
    /// Entry id, used by the hierarchy and alias indices.
    Id(EntryId),
    /// Structural key of the rdn index.
    ParentRdn(ParentIdAndRdn),
}

impl IndexKey {
    /// Value key.
    pub fn value(v: impl Into<String>) -> Self {
        Self::Value(v.into())
    }

    /// Id inside an [`IndexKey::Id`].
    #[must_use]
    pub fn as_id(&self) -> Option<EntryId> {
        match self {
            Self::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Structural key inside an [`IndexKey::ParentRdn`].
    #[must_use]
    pub fn as_parent_rdn(&self) -> Option<&ParentIdAndRdn> {
        match self {
            Self::ParentRdn(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v:?}"),
            Self::Id(id) => write!(f, "{id}"),
            Self::ParentRdn(p) => write!(f, "{p}"),
        }
    }
}
