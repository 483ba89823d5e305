use super::keys::{alias_keys, is_shared, AliasLink, KeyDeriver, KeySet, Placement};
use crate::entry::{Entry, EntryId};
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexId, IndexKey, ParentIdAndRdn, SystemIndex};
use crate::logedit::{EntryChange, IndexChange};
use crate::name::Dn;
use crate::partition::Partition;
use crate::schema::SchemaAuthority;
use crate::txn::Transaction;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Deepest tree walked before the hierarchy is declared corrupt.
const MAX_DEPTH: usize = 4096;

/// One partition seen through one transaction.
///
/// Every read goes through the transaction, so it sees the transaction's
/// own pending edits and lands in its read set.
pub(crate) struct Session<'t> {
    txn: &'t mut Transaction,
    partition: &'t Arc<dyn Partition>,
    schema: Arc<dyn SchemaAuthority>,
    deriver: KeyDeriver,
    suffix: Dn,
}

impl<'t> Session<'t> {
    pub fn new(txn: &'t mut Transaction, partition: &'t Arc<dyn Partition>) -> CoreResult<Self> {
        if !partition.is_initialized() {
            return Err(CoreError::illegal_state(format!(
                "partition {} is not initialized",
                partition.id()
            )));
        }
        let caps = partition.capabilities();
        if !(caps.master_table && caps.indices) {
            return Err(CoreError::not_implemented("operations on this partition"));
        }
        Ok(Self {
            txn,
            schema: partition.schema(),
            deriver: KeyDeriver::new(partition.as_ref()),
            suffix: partition.suffix_dn(),
            partition,
        })
    }

    pub fn partition(&self) -> &Arc<dyn Partition> {
        self.partition
    }

    pub fn schema(&self) -> &dyn SchemaAuthority {
        self.schema.as_ref()
    }

    pub fn deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    pub fn suffix(&self) -> &Dn {
        &self.suffix
    }

    pub fn entry(&mut self, id: EntryId) -> CoreResult<Option<Entry>> {
        self.txn.entry(self.partition, id)
    }

    /// Entry `id`, which an index says exists.
    pub fn existing(&mut self, id: EntryId) -> CoreResult<Entry> {
        self.entry(id)?
            .ok_or_else(|| CoreError::storage_failure(format!("indexed entry {id} is missing from the master table")))
    }

    fn forward(&mut self, index: SystemIndex, key: IndexKey) -> CoreResult<Vec<EntryId>> {
        self.txn.forward(self.partition, &index.into(), &key)
    }

    /// Walks the rdn index from the context entry down to `dn`.
    pub fn resolve(&mut self, dn: &Dn) -> CoreResult<Option<EntryId>> {
        let Some(below) = dn.relative_to(&self.suffix).map(<[_]>::to_vec) else {
            return Ok(None);
        };
        let context = ParentIdAndRdn::new(EntryId::ROOT, self.suffix.normalized());
        let Some(mut current) = self.forward(SystemIndex::Rdn, IndexKey::ParentRdn(context))?.first().copied() else {
            return Ok(None);
        };
        // `below` is leaf first.
        for rdn in below.iter().rev() {
            let key = IndexKey::ParentRdn(ParentIdAndRdn::new(current, rdn.normalized()));
            match self.forward(SystemIndex::Rdn, key)?.first() {
                Some(next) => current = *next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Resolves `dn` and loads the entry, or fails with `NoSuchObject`.
    pub fn require(&mut self, dn: &Dn) -> CoreResult<(EntryId, Entry)> {
        let id = self.resolve(dn)?.ok_or_else(|| CoreError::no_such_object(dn))?;
        match self.entry(id)? {
            Some(entry) => Ok((id, entry)),
            None => Err(CoreError::no_such_object(dn)),
        }
    }

    /// Parent and normalized Rdn of `id`.
    fn position(&mut self, id: EntryId) -> CoreResult<ParentIdAndRdn> {
        let keys = self.txn.reverse(self.partition, &SystemIndex::Rdn.into(), id)?;
        match keys.as_slice() {
            [IndexKey::ParentRdn(p)] => Ok(p.clone()),
            _ => Err(CoreError::storage_failure(format!(
                "entry {id} has {} rdn index keys",
                keys.len()
            ))),
        }
    }

    /// `id` followed by its ancestors up to the context entry. Empty for
    /// [`EntryId::ROOT`].
    pub fn lineage(&mut self, id: EntryId) -> CoreResult<Vec<EntryId>> {
        let mut out = Vec::new();
        let mut current = id;
        while current != EntryId::ROOT {
            if out.contains(&current) || out.len() > MAX_DEPTH {
                return Err(CoreError::storage_failure(format!("cycle in the tree above {id}")));
            }
            out.push(current);
            current = self.position(current)?.parent;
        }
        Ok(out)
    }

    pub fn placement(&mut self, id: EntryId) -> CoreResult<Placement> {
        let position = self.position(id)?;
        let ancestors = self.lineage(position.parent)?;
        Ok(Placement {
            parent: position.parent,
            rdn: position.rdn,
            ancestors,
        })
    }

    /// Link of an alias to an existing target.
    pub fn link_to(&mut self, target: EntryId) -> CoreResult<AliasLink> {
        let parent = self.position(target)?.parent;
        Ok(AliasLink {
            target,
            target_ancestors: self.lineage(parent)?,
        })
    }

    /// Link recorded in the alias index for `id`, if any.
    pub fn alias_link(&mut self, id: EntryId) -> CoreResult<Option<AliasLink>> {
        let keys = self.txn.reverse(self.partition, &SystemIndex::Alias.into(), id)?;
        match keys.first().and_then(IndexKey::as_id) {
            Some(target) => self.link_to(target).map(Some),
            None => Ok(None),
        }
    }

    pub fn children(&mut self, id: EntryId) -> CoreResult<Vec<EntryId>> {
        self.forward(SystemIndex::OneLevel, IndexKey::Id(id))
    }

    /// `id` and every entry below it.
    pub fn subtree(&mut self, id: EntryId) -> CoreResult<Vec<EntryId>> {
        self.forward(SystemIndex::SubLevel, IndexKey::Id(id))
    }

    /// Aliases pointing at `target`.
    pub fn aliases_of(&mut self, target: EntryId) -> CoreResult<Vec<EntryId>> {
        self.forward(SystemIndex::Alias, IndexKey::Id(target))
    }

    /// Slots `entry` occupies at its current position.
    pub fn current_keys(&mut self, id: EntryId, entry: &Entry) -> CoreResult<KeySet> {
        let placement = self.placement(id)?;
        let link = self.alias_link(id)?;
        Ok(self.deriver.derive(id, entry, &placement, link.as_ref()))
    }

    pub fn emit_entry(&mut self, id: EntryId, dn: Dn, change: EntryChange) -> CoreResult<()> {
        self.txn.emit_entry(self.partition, id, dn, change)
    }

    /// Emits the index edits turning `before` into `after`.
    ///
    /// A shared alias slot stays while any alias outside `affected` still
    /// derives it, and is added only when nobody holds it yet.
    pub fn emit_diff(&mut self, before: &KeySet, after: &KeySet, affected: &BTreeSet<EntryId>) -> CoreResult<()> {
        for pair in before.difference(after) {
            if is_shared(pair) && self.held_elsewhere(pair, affected)? {
                continue;
            }
            let (index, key, id) = pair;
            self.txn
                .emit_index(self.partition, index, key.clone(), *id, IndexChange::Delete)?;
        }
        for pair in after.difference(before) {
            let (index, key, id) = pair;
            if is_shared(pair) && self.txn.contains(self.partition, index, key, *id)? {
                continue;
            }
            self.txn
                .emit_index(self.partition, index, key.clone(), *id, IndexChange::Add)?;
        }
        Ok(())
    }

    fn held_elsewhere(&mut self, pair: &(IndexId, IndexKey, EntryId), affected: &BTreeSet<EntryId>) -> CoreResult<bool> {
        let target = pair.2;
        let aliases = self.aliases_of(target)?;
        for alias in aliases.into_iter().filter(|a| !affected.contains(a)) {
            let placement = self.placement(alias)?;
            let link = self.link_to(target)?;
            if alias_keys(alias, &placement, &link).contains(pair) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
