use crate::entry::{Entry, EntryId};
use crate::index::{IndexId, IndexKey};
use std::collections::{BTreeMap, HashMap};

/// Uncommitted changes of one transaction against one partition.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overlay {
    /// `None` marks a deleted entry.
    entries: HashMap<EntryId, Option<Entry>>,
    /// `true` marks an added pair, `false` a deleted one.
    pairs: BTreeMap<(IndexId, IndexKey, EntryId), bool>,
}

impl Overlay {
    /// `Some(row)` when the transaction wrote entry `id`.
    pub fn entry(&self, id: EntryId) -> Option<Option<&Entry>> {
        self.entries.get(&id).map(Option::as_ref)
    }

    pub fn put_entry(&mut self, id: EntryId, row: Option<Entry>) {
        self.entries.insert(id, row);
    }

    pub fn set_pair(&mut self, index: &IndexId, key: &IndexKey, id: EntryId, present: bool) {
        self.pairs.insert((index.clone(), key.clone(), id), present);
    }

    pub fn pair(&self, index: &IndexId, key: &IndexKey, id: EntryId) -> Option<bool> {
        self.pairs.get(&(index.clone(), key.clone(), id)).copied()
    }

    /// Applies local pair changes under `key` to committed `ids`.
    pub fn adjust_forward(&self, index: &IndexId, key: &IndexKey, ids: &mut Vec<EntryId>) {
        let range = (index.clone(), key.clone(), EntryId::MIN)..=(index.clone(), key.clone(), EntryId::MAX);
        for ((_, _, id), &present) in self.pairs.range(range) {
            let pos = ids.iter().position(|x| x == id);
            match (present, pos) {
                (true, None) => ids.push(*id),
                (false, Some(i)) => {
                    ids.remove(i);
                }
                _ => {}
            }
        }
    }

    /// Applies local pair changes of `id` to committed `keys`.
    pub fn adjust_reverse(&self, index: &IndexId, id: EntryId, keys: &mut Vec<IndexKey>) {
        for ((i, key, pid), &present) in &self.pairs {
            if i != index || *pid != id {
                continue;
            }
            let pos = keys.iter().position(|k| k == key);
            match (present, pos) {
                (true, None) => keys.push(key.clone()),
                (false, Some(p)) => {
                    keys.remove(p);
                }
                _ => {}
            }
        }
        keys.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SystemIndex;

    #[test]
    fn forward_adjustment_adds_and_hides() {
        let index = IndexId::System(SystemIndex::OneLevel);
        let key = IndexKey::Id(EntryId::DEFAULT);
        let (a, b) = (EntryId::from_bytes([1; 16]), EntryId::from_bytes([2; 16]));
        let mut overlay = Overlay::default();
        overlay.set_pair(&index, &key, a, false);
        overlay.set_pair(&index, &key, b, true);
        overlay.set_pair(&index, &IndexKey::Id(a), b, true);

        let mut ids = vec![a];
        overlay.adjust_forward(&index, &key, &mut ids);
        assert_eq!(ids, vec![b]);
        assert_eq!(overlay.pair(&index, &key, a), Some(false));
    }

    #[test]
    fn reverse_adjustment_filters_by_index_and_id() {
        let one = IndexId::System(SystemIndex::OneLevel);
        let sub = IndexId::System(SystemIndex::SubLevel);
        let id = EntryId::from_bytes([3; 16]);
        let mut overlay = Overlay::default();
        overlay.set_pair(&one, &IndexKey::Id(EntryId::DEFAULT), id, true);
        overlay.set_pair(&sub, &IndexKey::Id(id), id, true);

        let mut keys = Vec::new();
        overlay.adjust_reverse(&one, id, &mut keys);
        assert_eq!(keys, vec![IndexKey::Id(EntryId::DEFAULT)]);
    }

    #[test]
    fn deleted_entry_reads_as_absent() {
        let mut overlay = Overlay::default();
        let id = EntryId::from_bytes([4; 16]);
        assert_eq!(overlay.entry(id), None);
        overlay.put_entry(id, None);
        assert_eq!(overlay.entry(id), Some(None));
    }
}
