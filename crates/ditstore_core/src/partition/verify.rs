//! Index consistency checking.

use super::Partition;
use crate::entry::{Entry, EntryId};
use crate::error::CoreResult;
use crate::index::{Index, IndexId, IndexKey, SystemIndex};
use crate::operation::keys::{AliasLink, KeyDeriver, KeySet, Placement};
use crate::types::DataVersion;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// One disagreement between the master table and the indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// A slot the entry should occupy is absent.
    MissingKey {
        /// Index name.
        index: String,
        /// Key text.
        key: String,
        /// Entry id.
        id: EntryId,
    },
    /// A slot is present that no entry accounts for.
    UnexpectedKey {
        /// Index name.
        index: String,
        /// Key text.
        key: String,
        /// Entry id.
        id: EntryId,
    },
    /// Forward and reverse maps disagree on a pair.
    ReverseMismatch {
        /// Index name.
        index: String,
        /// Key text.
        key: String,
        /// Entry id.
        id: EntryId,
    },
    /// The tree shape itself is broken around this entry.
    Structure {
        /// Entry id.
        id: EntryId,
        /// What is wrong.
        problem: String,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey { index, key, id } => write!(f, "{index}: missing {key} -> {id}"),
            Self::UnexpectedKey { index, key, id } => write!(f, "{index}: unexpected {key} -> {id}"),
            Self::ReverseMismatch { index, key, id } => write!(f, "{index}: reverse mismatch {key} -> {id}"),
            Self::Structure { id, problem } => write!(f, "{id}: {problem}"),
        }
    }
}

struct Tree<'a> {
    rdn: &'a Index,
    entries: &'a BTreeMap<EntryId, Entry>,
    at: DataVersion,
}

impl Tree<'_> {
    fn position(&self, id: EntryId) -> Result<(EntryId, String), String> {
        let keys = self.rdn.reverse_lookup(id, self.at);
        match keys.as_slice() {
            [IndexKey::ParentRdn(p)] => Ok((p.parent, p.rdn.clone())),
            [] => Err("no rdn index entry".into()),
            [_] => Err("rdn index key is not structural".into()),
            _ => Err(format!("{} rdn index entries", keys.len())),
        }
    }

    fn lineage(&self, id: EntryId) -> Result<Vec<EntryId>, String> {
        let mut out = Vec::new();
        let mut current = id;
        loop {
            let (parent, _) = self.position(current)?;
            if parent == EntryId::ROOT {
                return Ok(out);
            }
            if !self.entries.contains_key(&parent) {
                return Err(format!("ancestor {parent} does not exist"));
            }
            if out.contains(&parent) || parent == id {
                return Err("cycle in parent chain".into());
            }
            out.push(parent);
            current = parent;
        }
    }
}

fn visible(chain: &[(DataVersion, Option<()>)], at: DataVersion) -> bool {
    chain
        .iter()
        .rev()
        .find(|(version, _)| *version <= at)
        .is_some_and(|(_, value)| value.is_some())
}

/// Checks every index of `partition` against its master table as of `at`.
///
/// # Errors
///
/// Fails only when the partition cannot expose its stores.
pub fn verify(partition: &dyn Partition, at: DataVersion) -> CoreResult<Vec<Inconsistency>> {
    let master = partition.master_table()?;
    let rdn = partition.system_index(SystemIndex::Rdn)?;
    let alias = partition.system_index(SystemIndex::Alias)?;
    let deriver = KeyDeriver::new(partition);
    let suffix = partition.suffix_dn();
    let entries: BTreeMap<EntryId, Entry> = master.scan(at).into_iter().collect();
    let tree = Tree {
        rdn: &rdn,
        entries: &entries,
        at,
    };

    let mut problems = Vec::new();
    let mut expected = KeySet::new();
    for (&id, entry) in &entries {
        let located = tree
            .position(id)
            .and_then(|position| tree.lineage(id).map(|ancestors| (position, ancestors)));
        let ((parent, rdn_text), ancestors) = match located {
            Ok(found) => found,
            Err(problem) => {
                problems.push(Inconsistency::Structure { id, problem });
                expected.extend(deriver.content_keys(id, entry));
                continue;
            }
        };
        let is_context = parent == EntryId::ROOT;
        if is_context != (id == partition.default_id()) {
            problems.push(Inconsistency::Structure {
                id,
                problem: "only the context entry may sit under the root".into(),
            });
        }
        let stored = if is_context {
            entry.dn().normalized().to_string()
        } else {
            entry.dn().rdn().map(|r| r.normalized().to_string()).unwrap_or_default()
        };
        if stored != rdn_text || !entry.dn().is_descendant_or_self(&suffix) {
            problems.push(Inconsistency::Structure {
                id,
                problem: format!("stored dn {} disagrees with position {rdn_text}", entry.dn()),
            });
        }
        let placement = Placement {
            parent,
            rdn: rdn_text,
            ancestors,
        };
        let link = entry
            .is_alias()
            .then(|| alias.reverse_lookup(id, at))
            .and_then(|keys| keys.first().and_then(IndexKey::as_id))
            .and_then(|target| {
                tree.lineage(target).ok().map(|target_ancestors| AliasLink {
                    target,
                    target_ancestors,
                })
            });
        expected.extend(deriver.derive(id, entry, &placement, link.as_ref()));
    }

    let mut indices: Vec<Arc<Index>> = SystemIndex::ALL
        .into_iter()
        .map(|s| partition.system_index(s))
        .collect::<CoreResult<_>>()?;
    indices.extend(partition.user_indices());

    let mut actual = KeySet::new();
    for index in &indices {
        let forward: BTreeSet<(IndexKey, EntryId)> = index.cursor(at).collect();
        let dump = index.dump();
        let reverse: BTreeSet<(IndexKey, EntryId)> = dump
            .reverse
            .iter()
            .filter(|(_, chain)| visible(chain, at))
            .map(|((id, key), _)| (key.clone(), *id))
            .collect();
        for (key, id) in forward.symmetric_difference(&reverse) {
            problems.push(Inconsistency::ReverseMismatch {
                index: index.id().to_string(),
                key: key.to_string(),
                id: *id,
            });
        }
        actual.extend(forward.into_iter().map(|(key, id)| (index.id().clone(), key, id)));
    }

    let name = |index: &IndexId| index.to_string();
    for (index, key, id) in expected.difference(&actual) {
        problems.push(Inconsistency::MissingKey {
            index: name(index),
            key: key.to_string(),
            id: *id,
        });
    }
    for (index, key, id) in actual.difference(&expected) {
        problems.push(Inconsistency::UnexpectedKey {
            index: name(index),
            key: key.to_string(),
            id: *id,
        });
    }
    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ParentIdAndRdn;
    use crate::name::Dn;
    use crate::partition::StorePartition;
    use crate::schema::Schema;

    fn seeded() -> (StorePartition, DataVersion) {
        let p = StorePartition::new(Arc::new(Schema::core()), "test", Dn::parse("dc=test").unwrap());
        p.initialize().unwrap();
        let v = DataVersion::new(1);
        let entry = Entry::new(Dn::parse("dc=test").unwrap())
            .with("objectClass", ["top", "domain"])
            .with("dc", ["test"]);
        let id = EntryId::DEFAULT;
        p.master_table().unwrap().put(id, Some(entry.clone()), v);
        for (index, key, pid) in KeyDeriver::new(&p).derive(id, &entry, &Placement::context("dc=test"), None) {
            p.index(&index).unwrap().apply(&key, pid, true, v);
        }
        (p, v)
    }

    #[test]
    fn consistent_partition_has_no_findings() {
        let (p, v) = seeded();
        assert_eq!(verify(&p, v).unwrap(), vec![]);
    }

    #[test]
    fn stray_key_is_reported() {
        let (p, v) = seeded();
        let stray = EntryId::new();
        p.system_index(SystemIndex::OneLevel)
            .unwrap()
            .apply(&IndexKey::Id(EntryId::DEFAULT), stray, true, v);
        let findings = verify(&p, v).unwrap();
        assert_eq!(findings.len(), 1);
        assert!(matches!(&findings[0], Inconsistency::UnexpectedKey { id, .. } if *id == stray));
    }

    #[test]
    fn missing_rdn_entry_is_structural() {
        let (p, v) = seeded();
        p.system_index(SystemIndex::Rdn).unwrap().apply(
            &IndexKey::ParentRdn(ParentIdAndRdn::new(EntryId::ROOT, "dc=test")),
            EntryId::DEFAULT,
            false,
            DataVersion::new(2),
        );
        let findings = verify(&p, DataVersion::new(2)).unwrap();
        assert!(findings
            .iter()
            .any(|f| matches!(f, Inconsistency::Structure { id, .. } if *id == EntryId::DEFAULT)));
        assert!(verify(&p, v).unwrap().is_empty());
    }
}
