//! Derivation of the full index key set of one entry.
//!
//! Every index change an operation emits is the difference between the key
//! set derived before and the one derived after. The verifier derives the
//! same sets from committed state and compares them with the indices.

use crate::entry::{Entry, EntryId};
use crate::index::{IndexId, IndexKey, ParentIdAndRdn, SystemIndex};
use crate::name::normalize_value;
use crate::partition::Partition;
use crate::schema::SchemaAuthority;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One `(index, key, id)` slot.
pub(crate) type Pair = (IndexId, IndexKey, EntryId);

/// Ordered set of slots.
pub(crate) type KeySet = BTreeSet<Pair>;

/// Position of an entry in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placement {
    pub parent: EntryId,
    /// Normalized Rdn, or the whole normalized suffix for the context entry.
    pub rdn: String,
    /// Parent first, up to and including the context entry. Never holds
    /// [`EntryId::ROOT`].
    pub ancestors: Vec<EntryId>,
}

impl Placement {
    /// Placement of the context entry.
    pub fn context(suffix: &str) -> Self {
        Self {
            parent: EntryId::ROOT,
            rdn: suffix.to_string(),
            ancestors: Vec::new(),
        }
    }

    /// Placement of a child of `parent`, where `parent` sits at
    /// `parent_ancestors`.
    pub fn under(parent: EntryId, rdn: impl Into<String>, parent_ancestors: &[EntryId]) -> Self {
        let mut ancestors = Vec::with_capacity(parent_ancestors.len() + 1);
        ancestors.push(parent);
        ancestors.extend_from_slice(parent_ancestors);
        Self {
            parent,
            rdn: rdn.into(),
            ancestors,
        }
    }
}

/// An alias's resolved link to its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AliasLink {
    pub target: EntryId,
    /// Parent first, up to the context entry.
    pub target_ancestors: Vec<EntryId>,
}

impl AliasLink {
    fn target_parent(&self) -> EntryId {
        self.target_ancestors.first().copied().unwrap_or(EntryId::ROOT)
    }
}

/// Key derivation for one partition.
pub(crate) struct KeyDeriver {
    schema: Arc<dyn SchemaAuthority>,
    user: Vec<String>,
}

impl KeyDeriver {
    pub fn new(partition: &dyn Partition) -> Self {
        Self {
            schema: partition.schema(),
            user: partition
                .user_indices()
                .iter()
                .map(|index| index.id().oid().to_string())
                .collect(),
        }
    }

    /// Every slot the entry occupies.
    pub fn derive(&self, id: EntryId, entry: &Entry, placement: &Placement, link: Option<&AliasLink>) -> KeySet {
        let mut keys = self.content_keys(id, entry);
        keys.extend(structural_keys(id, placement));
        if let Some(link) = link {
            keys.extend(alias_keys(id, placement, link));
        }
        keys
    }

    /// Presence, objectClass and user index slots.
    pub fn content_keys(&self, id: EntryId, entry: &Entry) -> KeySet {
        let mut keys = KeySet::new();
        for attr in entry.attributes() {
            let oid = self
                .schema
                .attribute_type(attr.id())
                .map_or_else(|| attr.id().to_ascii_lowercase(), |at| at.oid.clone());
            keys.insert((SystemIndex::Presence.into(), IndexKey::Value(oid), id));
        }
        for class in entry.values("objectClass") {
            let oid = self
                .schema
                .object_class(class.trim())
                .map_or_else(|| normalize_value(class), |oc| oc.oid.clone());
            keys.insert((SystemIndex::ObjectClass.into(), IndexKey::Value(oid), id));
        }
        for oid in &self.user {
            for key in self.user_keys(oid, entry) {
                keys.insert((IndexId::User(oid.clone()), key, id));
            }
        }
        keys
    }

    /// Keys of the user index on the attribute with `oid`.
    pub fn user_keys(&self, oid: &str, entry: &Entry) -> Vec<IndexKey> {
        let mut out = Vec::new();
        for attr in entry.attributes() {
            let Some(at) = self.schema.attribute_type(attr.id()) else {
                continue;
            };
            if at.oid != oid {
                continue;
            }
            for value in attr.values() {
                if let Ok(norm) = at.normalize(value) {
                    let key = IndexKey::Value(norm);
                    if !out.contains(&key) {
                        out.push(key);
                    }
                }
            }
        }
        out
    }
}

/// Rdn, oneLevel and subLevel slots.
pub(crate) fn structural_keys(id: EntryId, placement: &Placement) -> KeySet {
    let mut keys = KeySet::new();
    keys.insert((
        SystemIndex::Rdn.into(),
        IndexKey::ParentRdn(ParentIdAndRdn::new(placement.parent, placement.rdn.clone())),
        id,
    ));
    keys.insert((SystemIndex::OneLevel.into(), IndexKey::Id(placement.parent), id));
    keys.insert((SystemIndex::SubLevel.into(), IndexKey::Id(id), id));
    for ancestor in &placement.ancestors {
        keys.insert((SystemIndex::SubLevel.into(), IndexKey::Id(*ancestor), id));
    }
    keys
}

/// alias, oneAlias and subAlias slots of the alias `id`.
pub(crate) fn alias_keys(id: EntryId, placement: &Placement, link: &AliasLink) -> KeySet {
    let mut keys = KeySet::new();
    keys.insert((SystemIndex::Alias.into(), IndexKey::Id(link.target), id));
    if link.target_parent() != placement.parent {
        keys.insert((SystemIndex::OneAlias.into(), IndexKey::Id(placement.parent), link.target));
    }
    for ancestor in &placement.ancestors {
        if !link.target_ancestors.contains(ancestor) {
            keys.insert((SystemIndex::SubAlias.into(), IndexKey::Id(*ancestor), link.target));
        }
    }
    keys
}

/// True for slots whose id is an alias target rather than the entry that
/// produced them. Several aliases can share such a slot.
pub(crate) fn is_shared(pair: &Pair) -> bool {
    matches!(
        pair.0,
        IndexId::System(SystemIndex::OneAlias) | IndexId::System(SystemIndex::SubAlias)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u8) -> Vec<EntryId> {
        (1..=n).map(|i| EntryId::from_bytes([i; 16])).collect()
    }

    #[test]
    fn structural_keys_cover_every_ancestor() {
        let v = ids(3);
        let (ctx, ou, me) = (v[0], v[1], v[2]);
        let placement = Placement::under(ou, "cn=me", &[ctx]);
        let keys = structural_keys(me, &placement);
        assert!(keys.contains(&(SystemIndex::SubLevel.into(), IndexKey::Id(ctx), me)));
        assert!(keys.contains(&(SystemIndex::SubLevel.into(), IndexKey::Id(ou), me)));
        assert!(keys.contains(&(SystemIndex::SubLevel.into(), IndexKey::Id(me), me)));
        assert!(keys.contains(&(SystemIndex::OneLevel.into(), IndexKey::Id(ou), me)));
        assert_eq!(keys.len(), 5);
    }

    #[test]
    fn context_entry_sits_under_root() {
        let keys = structural_keys(EntryId::DEFAULT, &Placement::context("dc=test"));
        assert!(keys.contains(&(
            SystemIndex::Rdn.into(),
            IndexKey::ParentRdn(ParentIdAndRdn::new(EntryId::ROOT, "dc=test")),
            EntryId::DEFAULT
        )));
        assert!(keys.contains(&(
            SystemIndex::OneLevel.into(),
            IndexKey::Id(EntryId::ROOT),
            EntryId::DEFAULT
        )));
    }

    #[test]
    fn sibling_alias_has_no_one_alias_key() {
        let v = ids(4);
        let (ctx, ou, alias, target) = (v[0], v[1], v[2], v[3]);
        let placement = Placement::under(ou, "cn=a", &[ctx]);
        let sibling = AliasLink {
            target,
            target_ancestors: vec![ou, ctx],
        };
        let keys = alias_keys(alias, &placement, &sibling);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&(SystemIndex::Alias.into(), IndexKey::Id(target), alias)));
    }

    #[test]
    fn remote_alias_gets_one_and_sub_alias_keys() {
        let v = ids(5);
        let (ctx, left, right, alias, target) = (v[0], v[1], v[2], v[3], v[4]);
        let placement = Placement::under(left, "cn=a", &[ctx]);
        let link = AliasLink {
            target,
            target_ancestors: vec![right, ctx],
        };
        let keys = alias_keys(alias, &placement, &link);
        assert!(keys.contains(&(SystemIndex::OneAlias.into(), IndexKey::Id(left), target)));
        assert!(keys.contains(&(SystemIndex::SubAlias.into(), IndexKey::Id(left), target)));
        assert!(!keys.contains(&(SystemIndex::SubAlias.into(), IndexKey::Id(ctx), target)));
        assert!(keys.iter().filter(|p| is_shared(p)).count() == 2);
    }
}
