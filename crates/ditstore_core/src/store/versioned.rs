//! Multi-version ordered map.

use crate::types::DataVersion;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::RangeBounds;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot<V> {
    version: DataVersion,
    value: Option<V>,
}

/// What a version slot held before a write. Handing it back to
/// [`VersionedMap::restore`] puts the slot back exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prior<V> {
    /// No slot existed at that version.
    Vacant,
    /// A slot existed holding this value (`None` is a tombstone).
    Held(Option<V>),
}

/// One key's version chain as returned by [`VersionedMap::dump`].
pub type Chain<V> = Vec<(DataVersion, Option<V>)>;

/// Ordered map where every key carries a chain of `(version, value)`
/// slots sorted by version.
///
/// A read at version `v` returns the newest slot stamped `<= v`. A `None`
/// slot is a tombstone. Writes at a version above every live snapshot stay
/// invisible to those snapshots, which is what lets commit apply changes
/// while readers run.
#[derive(Debug)]
pub struct VersionedMap<K, V> {
    chains: RwLock<BTreeMap<K, Vec<Slot<V>>>>,
}

impl<K, V> Default for VersionedMap<K, V> {
    fn default() -> Self {
        Self {
            chains: RwLock::new(BTreeMap::new()),
        }
    }
}

fn visible<V>(chain: &[Slot<V>], at: DataVersion) -> Option<&Slot<V>> {
    chain.iter().rev().find(|slot| slot.version <= at)
}

impl<K: Ord + Clone, V: Clone> VersionedMap<K, V> {
    /// Empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key` as of `at`.
    pub fn get(&self, key: &K, at: DataVersion) -> Option<V> {
        let chains = self.chains.read();
        chains
            .get(key)
            .and_then(|chain| visible(chain, at))
            .and_then(|slot| slot.value.clone())
    }

    /// Writes `value` (or a tombstone) at `version`, returning what the slot
    /// held before.
    pub fn put(&self, key: K, value: Option<V>, version: DataVersion) -> Prior<V> {
        let mut chains = self.chains.write();
        let chain = chains.entry(key).or_default();
        let pos = chain.partition_point(|slot| slot.version < version);
        match chain.get_mut(pos) {
            Some(slot) if slot.version == version => Prior::Held(std::mem::replace(&mut slot.value, value)),
            _ => {
                chain.insert(pos, Slot { version, value });
                Prior::Vacant
            }
        }
    }

    /// Undoes a [`put`](Self::put).
    pub fn restore(&self, key: &K, version: DataVersion, prior: Prior<V>) {
        let mut chains = self.chains.write();
        let Some(chain) = chains.get_mut(key) else {
            return;
        };
        let Some(pos) = chain.iter().position(|slot| slot.version == version) else {
            return;
        };
        match prior {
            Prior::Held(value) => chain[pos].value = value,
            Prior::Vacant => {
                chain.remove(pos);
                if chain.is_empty() {
                    chains.remove(key);
                }
            }
        }
    }

    /// Live `(key, value)` pairs inside `range` as of `at`.
    pub fn range<R: RangeBounds<K>>(&self, range: R, at: DataVersion) -> Vec<(K, V)> {
        let chains = self.chains.read();
        chains
            .range(range)
            .filter_map(|(k, chain)| {
                visible(chain, at)
                    .and_then(|slot| slot.value.clone())
                    .map(|v| (k.clone(), v))
            })
            .collect()
    }

    /// Number of live keys as of `at`.
    pub fn count(&self, at: DataVersion) -> usize {
        let chains = self.chains.read();
        chains
            .values()
            .filter(|chain| visible(chain, at).is_some_and(|slot| slot.value.is_some()))
            .count()
    }

    /// Version of the newest write to `key`, committed or not.
    pub fn latest_version(&self, key: &K) -> Option<DataVersion> {
        let chains = self.chains.read();
        chains.get(key).and_then(|chain| chain.last()).map(|slot| slot.version)
    }

    /// Newest write version of any key inside `range`.
    pub fn latest_version_in<R: RangeBounds<K>>(&self, range: R) -> Option<DataVersion> {
        let chains = self.chains.read();
        chains
            .range(range)
            .filter_map(|(_, chain)| chain.last().map(|slot| slot.version))
            .max()
    }

    /// Drops slots that no snapshot at or above `horizon` can see. Returns
    /// the number of slots removed.
    pub fn prune(&self, horizon: DataVersion) -> usize {
        let mut chains = self.chains.write();
        let mut removed = 0;
        chains.retain(|_, chain| {
            let keep_from = chain
                .iter()
                .rposition(|slot| slot.version <= horizon)
                .unwrap_or(0);
            removed += keep_from;
            chain.drain(..keep_from);
            let dead = chain.len() == 1 && chain[0].value.is_none() && chain[0].version <= horizon;
            if dead {
                removed += 1;
            }
            !dead
        });
        removed
    }

    /// Full contents including history, for state comparison in tests and
    /// diagnostics.
    pub fn dump(&self) -> Vec<(K, Chain<V>)> {
        let chains = self.chains.read();
        chains
            .iter()
            .map(|(k, chain)| {
                (
                    k.clone(),
                    chain.iter().map(|slot| (slot.version, slot.value.clone())).collect(),
                )
            })
            .collect()
    }
}
