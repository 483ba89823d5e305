//! Secondary indices.
//!
//! Every index is a forward map `(key, id)` plus a reverse map `(id, key)`,
//! both versioned. System indices describe the tree shape and aliases; user
//! indices hold normalized values of one attribute.
//!
//! | system index | key | id |
//! |---|---|---|
//! | rdn | `(parent, rdn)` | the entry |
//! | presence | attribute OID | entries holding it |
//! | objectClass | class OID | entries of that class |
//! | oneLevel | parent | each child |
//! | subLevel | each ancestor, and the entry itself | the entry |
//! | alias | alias target | the alias |
//! | oneAlias | alias parent | target |
//! | subAlias | each alias ancestor | target |

mod key;

pub use key::{IndexKey, ParentIdAndRdn};

use crate::entry::EntryId;
use crate::store::{Chain, Prior, VersionedMap};
use crate::types::DataVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Bound;

/// The system indices every partition maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SystemIndex {
    /// Attribute existence.
    Presence,
    /// Parent -> child.
    OneLevel,
    /// Alias parent -> target.
    OneAlias,
    /// Alias ancestor -> target.
    SubAlias,
    /// Target -> alias.
    Alias,
    /// Ancestor -> descendant.
    SubLevel,
    /// `(parent, rdn)` -> entry.
    Rdn,
    /// objectClass -> entry.
    ObjectClass,
}

impl SystemIndex {
    /// All system indices.
    pub const ALL: [SystemIndex; 8] = [
        Self::Presence,
        Self::OneLevel,
        Self::OneAlias,
        Self::SubAlias,
        Self::Alias,
        Self::SubLevel,
        Self::Rdn,
        Self::ObjectClass,
    ];

    /// OID the index is tagged with in the log.
    #[must_use]
    pub const fn oid(self) -> &'static str {
        match self {
            Self::Presence => "1.3.6.1.4.1.18060.0.4.1.2.3",
            Self::OneLevel => "1.3.6.1.4.1.18060.0.4.1.2.4",
            Self::OneAlias => "1.3.6.1.4.1.18060.0.4.1.2.5",
            Self::SubAlias => "1.3.6.1.4.1.18060.0.4.1.2.6",
            Self::Alias => "1.3.6.1.4.1.18060.0.4.1.2.7",
            Self::SubLevel => "1.3.6.1.4.1.18060.0.4.1.2.43",
            Self::Rdn => "1.3.6.1.4.1.18060.0.4.1.2.50",
            Self::ObjectClass => "2.5.4.0",
        }
    }

    /// Short name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Presence => "presence",
            Self::OneLevel => "oneLevel",
            Self::OneAlias => "oneAlias",
            Self::SubAlias => "subAlias",
            Self::Alias => "alias",
            Self::SubLevel => "subLevel",
            Self::Rdn => "rdn",
            Self::ObjectClass => "objectClass",
        }
    }

    /// Inverse of [`oid`](Self::oid).
    #[must_use]
    pub fn from_oid(oid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.oid() == oid)
    }

    /// Inverse of [`name`](Self::name), case-insensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }
}

/// Address of an index within a partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexId {
    /// A system index.
    System(SystemIndex),
    /// A user index on the attribute with this OID.
    User(String),
}

impl IndexId {
    /// OID tag.
    #[must_use]
    pub fn oid(&self) -> &str {
        match self {
            Self::System(s) => s.oid(),
            Self::User(oid) => oid,
        }
    }

    /// System/user flag.
    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// Rebuilds an id from the tag and flag carried in the log.
    #[must_use]
    pub fn from_tag(oid: &str, system: bool) -> Option<Self> {
        if system {
            SystemIndex::from_oid(oid).map(Self::System)
        } else {
            Some(Self::User(oid.to_string()))
        }
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System(s) => f.write_str(s.name()),
            Self::User(oid) => write!(f, "user:{oid}"),
        }
    }
}

impl From<SystemIndex> for IndexId {
    fn from(s: SystemIndex) -> Self {
        Self::System(s)
    }
}

/// What one [`Index::apply`] overwrote.
#[derive(Debug)]
pub struct IndexUndo {
    key: IndexKey,
    id: EntryId,
    version: DataVersion,
    forward: Prior<()>,
    reverse: Prior<()>,
}

/// Forward and reverse contents of an index including history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDump {
    /// `(key, id)` chains.
    pub forward: Vec<((IndexKey, EntryId), Chain<()>)>,
    /// `(id, key)` chains.
    pub reverse: Vec<((EntryId, IndexKey), Chain<()>)>,
}

/// One index.
#[derive(Debug)]
pub struct Index {
    id: IndexId,
    attribute: String,
    cache_size: usize,
    forward: VersionedMap<(IndexKey, EntryId), ()>,
    reverse: VersionedMap<(EntryId, IndexKey), ()>,
}

impl Index {
    /// Empty index. `attribute` is the display name used by dumps.
    pub fn new(id: IndexId, attribute: impl Into<String>, cache_size: usize) -> Self {
        Self {
            id,
            attribute: attribute.into(),
            cache_size,
            forward: VersionedMap::new(),
            reverse: VersionedMap::new(),
        }
    }

    /// Address of this index.
    #[must_use]
    pub fn id(&self) -> &IndexId {
        &self.id
    }

    /// Attribute or system index name.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Configured cache size.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    fn key_range(key: &IndexKey) -> std::ops::RangeInclusive<(IndexKey, EntryId)> {
        (key.clone(), EntryId::MIN)..=(key.clone(), EntryId::MAX)
    }

    fn id_range(id: EntryId) -> (Bound<(EntryId, IndexKey)>, Bound<(EntryId, IndexKey)>) {
        let smallest = || IndexKey::Value(String::new());
        let upper = match u128::from_be_bytes(*id.as_bytes()).checked_add(1) {
            Some(next) => Bound::Excluded((EntryId::from_bytes(next.to_be_bytes()), smallest())),
            None => Bound::Unbounded,
        };
        (Bound::Included((id, smallest())), upper)
    }

    /// Ids stored under `key` as of `at`.
    #[must_use]
    pub fn forward_lookup(&self, key: &IndexKey, at: DataVersion) -> Vec<EntryId> {
        self.forward
            .range(Self::key_range(key), at)
            .into_iter()
            .map(|((_, id), ())| id)
            .collect()
    }

    /// Keys stored for `id` as of `at`.
    #[must_use]
    pub fn reverse_lookup(&self, id: EntryId, at: DataVersion) -> Vec<IndexKey> {
        self.reverse
            .range(Self::id_range(id), at)
            .into_iter()
            .map(|((_, key), ())| key)
            .collect()
    }

    /// True if `(key, id)` is present as of `at`.
    #[must_use]
    pub fn contains(&self, key: &IndexKey, id: EntryId, at: DataVersion) -> bool {
        self.forward.get(&(key.clone(), id), at).is_some()
    }

    /// Number of ids under `key` as of `at`.
    #[must_use]
    pub fn count(&self, key: &IndexKey, at: DataVersion) -> usize {
        self.forward.range(Self::key_range(key), at).len()
    }

    /// Ordered cursor over every `(key, id)` pair as of `at`.
    #[must_use]
    pub fn cursor(&self, at: DataVersion) -> IndexCursor {
        IndexCursor {
            pairs: self
                .forward
                .range(.., at)
                .into_iter()
                .map(|(pair, ())| pair)
                .collect(),
            position: 0,
        }
    }

    /// Version of the newest write to any pair under `key`.
    #[must_use]
    pub fn latest_key_version(&self, key: &IndexKey) -> Option<DataVersion> {
        self.forward.latest_version_in(Self::key_range(key))
    }

    /// Version of the newest write to the pair `(key, id)`.
    #[must_use]
    pub fn latest_pair_version(&self, key: &IndexKey, id: EntryId) -> Option<DataVersion> {
        self.forward.latest_version(&(key.clone(), id))
    }

    /// Version of the newest write to any reverse pair of `id`.
    #[must_use]
    pub fn latest_reverse_version(&self, id: EntryId) -> Option<DataVersion> {
        self.reverse.latest_version_in(Self::id_range(id))
    }

    /// Adds (`present`) or deletes `(key, id)` at `version` in both
    /// directions.
    pub fn apply(&self, key: &IndexKey, id: EntryId, present: bool, version: DataVersion) -> IndexUndo {
        let value = present.then_some(());
        IndexUndo {
            forward: self.forward.put((key.clone(), id), value, version),
            reverse: self.reverse.put((id, key.clone()), value, version),
            key: key.clone(),
            id,
            version,
        }
    }

    /// Reverts one [`apply`](Self::apply).
    pub fn undo(&self, undo: IndexUndo) {
        let IndexUndo {
            key,
            id,
            version,
            forward,
            reverse,
        } = undo;
        self.reverse.restore(&(id, key.clone()), version, reverse);
        self.forward.restore(&(key, id), version, forward);
    }

    pub(crate) fn prune(&self, horizon: DataVersion) -> usize {
        self.forward.prune(horizon) + self.reverse.prune(horizon)
    }

    /// Full contents including history.
    #[must_use]
    pub fn dump(&self) -> IndexDump {
        IndexDump {
            forward: self.forward.dump(),
            reverse: self.reverse.dump(),
        }
    }
}

/// Snapshot cursor over an index, ordered by `(key, id)`.
#[derive(Debug, Clone)]
pub struct IndexCursor {
    pairs: Vec<(IndexKey, EntryId)>,
    position: usize,
}

impl IndexCursor {
    /// Positions the cursor on the first pair whose key is `>= key`.
    pub fn seek(&mut self, key: &IndexKey) {
        self.position = self.pairs.partition_point(|(k, _)| k < key);
    }

    /// Pairs left to yield.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pairs.len() - self.position
    }
}

impl Iterator for IndexCursor {
    type Item = (IndexKey, EntryId);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.pairs.get(self.position).cloned();
        if item.is_some() {
            self.position += 1;
        }
        item
    }
}
