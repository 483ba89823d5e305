use super::failpoint::{self, Failpoints};
use super::lifecycle::Lifecycle;
use super::{io_error, AppliedEdit, Capabilities, Partition};
use crate::config::{IndexConfig, PartitionConfig};
use crate::entry::{Entry, EntryId};
use crate::error::{CoreError, CoreResult};
use crate::index::{Index, IndexDump, IndexId, SystemIndex};
use crate::logedit::{ActiveEdit, IndexChange};
use crate::name::Dn;
use crate::schema::SchemaAuthority;
use crate::store::{Chain, MasterTable};
use crate::types::DataVersion;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Identity {
    id: String,
    suffix: Dn,
    cache_size: usize,
    path: Option<PathBuf>,
    indexed: Vec<IndexConfig>,
}

#[derive(Debug)]
struct Stores {
    master: Arc<MasterTable>,
    system: BTreeMap<SystemIndex, Arc<Index>>,
    user: BTreeMap<String, Arc<Index>>,
}

/// Complete contents of a partition including version history.
///
/// Two partitions that went through the same committed edits produce equal
/// dumps, which is how atomicity tests compare before and after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDump {
    /// Master table chains.
    pub master: Vec<(EntryId, Chain<Entry>)>,
    /// Index contents by index name.
    pub indices: BTreeMap<String, IndexDump>,
}

/// Partition over versioned ordered stores.
#[derive(Debug)]
pub struct StorePartition {
    schema: Arc<dyn SchemaAuthority>,
    identity: RwLock<Identity>,
    lifecycle: Lifecycle,
    stores: RwLock<Option<Arc<Stores>>>,
    failpoints: Failpoints,
}

impl StorePartition {
    /// Uninitialized partition with default settings.
    pub fn new(schema: Arc<dyn SchemaAuthority>, id: impl Into<String>, suffix: Dn) -> Self {
        Self::from_config(schema, PartitionConfig::new(id, suffix))
    }

    /// Uninitialized partition from `config`.
    #[must_use]
    pub fn from_config(schema: Arc<dyn SchemaAuthority>, config: PartitionConfig) -> Self {
        Self {
            schema,
            identity: RwLock::new(Identity {
                id: config.id,
                suffix: config.suffix,
                cache_size: config.cache_size,
                path: config.path,
                indexed: config.indexed_attributes,
            }),
            lifecycle: Lifecycle::new(),
            stores: RwLock::new(None),
            failpoints: Failpoints::with_armed(config.failpoints),
        }
    }

    /// Failure injection switches.
    #[must_use]
    pub fn failpoints(&self) -> &Failpoints {
        &self.failpoints
    }

    /// Lifecycle state machine.
    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Configured cache size.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.identity.read().cache_size
    }

    /// Configured working path.
    #[must_use]
    pub fn partition_path(&self) -> Option<PathBuf> {
        self.identity.read().path.clone()
    }

    /// Attributes that get a user index at init.
    #[must_use]
    pub fn indexed_attributes(&self) -> Vec<IndexConfig> {
        self.identity.read().indexed.clone()
    }

    /// Changes the partition id.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] once initialized.
    pub fn set_id(&self, id: impl Into<String>) -> CoreResult<()> {
        self.lifecycle.ensure_configurable("id")?;
        self.identity.write().id = id.into();
        Ok(())
    }

    /// Changes the suffix.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] once initialized.
    pub fn set_suffix_dn(&self, suffix: Dn) -> CoreResult<()> {
        self.lifecycle.ensure_configurable("suffix")?;
        self.identity.write().suffix = suffix;
        Ok(())
    }

    /// Changes the cache size.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] once initialized.
    pub fn set_cache_size(&self, size: usize) -> CoreResult<()> {
        self.lifecycle.ensure_configurable("cache size")?;
        self.identity.write().cache_size = size;
        Ok(())
    }

    /// Changes the working path.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] once initialized.
    pub fn set_partition_path(&self, path: impl Into<PathBuf>) -> CoreResult<()> {
        self.lifecycle.ensure_configurable("path")?;
        self.identity.write().path = Some(path.into());
        Ok(())
    }

    /// Adds a user index built at the next init.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] once initialized.
    pub fn add_index(&self, attribute: &str, cache_size: usize) -> CoreResult<()> {
        self.lifecycle.ensure_configurable("indexed attributes")?;
        let mut identity = self.identity.write();
        if !identity.indexed.iter().any(|i| i.attribute.eq_ignore_ascii_case(attribute)) {
            identity.indexed.push(IndexConfig {
                attribute: attribute.to_string(),
                cache_size,
            });
        }
        Ok(())
    }

    /// Full contents, for state comparison.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`] when not initialized.
    pub fn dump(&self) -> CoreResult<PartitionDump> {
        let stores = self.stores()?;
        let indices = stores
            .system
            .values()
            .chain(stores.user.values())
            .map(|index| (index.id().to_string(), index.dump()))
            .collect();
        Ok(PartitionDump {
            master: stores.master.dump(),
            indices,
        })
    }

    fn stores(&self) -> CoreResult<Arc<Stores>> {
        let id = self.id();
        self.lifecycle.ensure_initialized(&id)?;
        self.stores
            .read()
            .clone()
            .ok_or_else(|| CoreError::illegal_state(format!("partition {id} has no stores")))
    }

    fn build(&self) -> CoreResult<()> {
        self.failpoints.check(failpoint::INIT)?;
        let identity = self.identity.read().clone();
        if let Some(path) = &identity.path {
            std::fs::create_dir_all(path).map_err(io_error)?;
        }
        let system = SystemIndex::ALL
            .into_iter()
            .map(|s| (s, Arc::new(Index::new(IndexId::System(s), s.name(), identity.cache_size))))
            .collect();
        let mut user = BTreeMap::new();
        for config in &identity.indexed {
            let at = self.schema.attribute_type(&config.attribute).ok_or_else(|| {
                CoreError::schema_violation(format!("cannot index unknown attribute {}", config.attribute))
            })?;
            user.insert(
                at.oid.clone(),
                Arc::new(Index::new(IndexId::User(at.oid.clone()), at.name(), config.cache_size)),
            );
        }
        *self.stores.write() = Some(Arc::new(Stores {
            master: Arc::new(MasterTable::new()),
            system,
            user,
        }));
        tracing::info!(partition = %identity.id, suffix = %identity.suffix, "partition initialized");
        Ok(())
    }

    fn teardown(&self) -> CoreResult<()> {
        *self.stores.write() = None;
        tracing::info!(partition = %self.id(), "partition destroyed");
        Ok(())
    }

    fn find_index(&self, name: &str) -> Option<Arc<Index>> {
        let stores = self.stores().ok()?;
        if let Some(s) = SystemIndex::from_name(name) {
            return stores.system.get(&s).cloned();
        }
        let oid = self.schema.attribute_type(name).map(|at| at.oid.clone())?;
        stores.user.get(&oid).cloned()
    }
}

impl Partition for StorePartition {
    fn id(&self) -> String {
        self.identity.read().id.clone()
    }

    fn suffix_dn(&self) -> Dn {
        self.identity.read().suffix.clone()
    }

    fn schema(&self) -> Arc<dyn SchemaAuthority> {
        Arc::clone(&self.schema)
    }

    fn initialize(&self) -> CoreResult<()> {
        self.lifecycle.initialize(|| self.build(), || self.teardown())
    }

    fn destroy(&self) -> CoreResult<()> {
        self.lifecycle.destroy(|| self.teardown())
    }

    fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn master_table(&self) -> CoreResult<Arc<MasterTable>> {
        Ok(Arc::clone(&self.stores()?.master))
    }

    fn index(&self, id: &IndexId) -> CoreResult<Arc<Index>> {
        let stores = self.stores()?;
        let found = match id {
            IndexId::System(s) => stores.system.get(s),
            IndexId::User(oid) => stores.user.get(oid),
        };
        found.cloned().ok_or_else(|| CoreError::IndexNotFound {
            oid: id.oid().to_string(),
        })
    }

    fn user_indices(&self) -> Vec<Arc<Index>> {
        self.stores()
            .map(|s| s.user.values().cloned().collect())
            .unwrap_or_default()
    }

    fn apply(&self, edit: &ActiveEdit, version: DataVersion) -> CoreResult<AppliedEdit> {
        let stores = self.stores()?;
        self.failpoints.check_apply()?;
        match edit {
            ActiveEdit::Entry(modification) => {
                let row = modification.post_image().cloned();
                let prior = stores.master.put(modification.id, row, version);
                Ok(AppliedEdit::Entry {
                    id: modification.id,
                    version,
                    prior,
                })
            }
            ActiveEdit::Index(bound) => {
                let live = self.index(bound.index().id())?;
                if !Arc::ptr_eq(&live, bound.index()) {
                    return Err(CoreError::illegal_state(format!(
                        "edit bound to a stale {} index of {}",
                        live.id(),
                        self.id()
                    )));
                }
                let m = bound.modification();
                let undo = live.apply(&m.key, m.id, m.change == IndexChange::Add, version);
                Ok(AppliedEdit::Index { index: live, undo })
            }
        }
    }

    fn prune(&self, horizon: DataVersion) -> usize {
        let Ok(stores) = self.stores() else {
            return 0;
        };
        stores.master.prune(horizon)
            + stores
                .system
                .values()
                .chain(stores.user.values())
                .map(|index| index.prune(horizon))
                .sum::<usize>()
    }

    fn dump_index(&self, out: &mut dyn io::Write, name: &str) -> CoreResult<()> {
        let Some(index) = self.find_index(name) else {
            return writeln!(out, "Nothing to dump for index {name}").map_err(io_error);
        };
        let dump = index.dump();
        writeln!(out, "index {} ({} keys)", index.id(), dump.forward.len()).map_err(io_error)?;
        for ((key, id), chain) in &dump.forward {
            let history: Vec<String> = chain
                .iter()
                .map(|(v, present)| format!("{v}{}", if present.is_some() { "+" } else { "-" }))
                .collect();
            writeln!(out, "  {key} -> {id} [{}]", history.join(" ")).map_err(io_error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryId;
    use crate::index::IndexKey;
    use crate::logedit::{EntryChange, EntryModification, IndexModification, LogEdit};
    use crate::schema::Schema;
    use crate::types::EditSequence;

    fn partition() -> StorePartition {
        let config = PartitionConfig::new("test", Dn::parse("dc=test").unwrap()).index("cn");
        StorePartition::from_config(Arc::new(Schema::core()), config)
    }

    fn entry_edit(id: EntryId) -> ActiveEdit {
        let entry = Entry::new(Dn::parse("cn=x,dc=test").unwrap()).with("cn", ["x"]);
        ActiveEdit::Entry(EntryModification {
            sequence: EditSequence(1),
            id,
            dn: entry.dn().clone(),
            change: EntryChange::Add { entry },
        })
    }

    #[test]
    fn operations_rejected_before_init() {
        let p = partition();
        assert!(matches!(p.master_table(), Err(CoreError::IllegalState { .. })));
        p.initialize().unwrap();
        assert!(p.master_table().is_ok());
        assert!(p.has_user_index_on("CN"));
        assert!(p.has_system_index_on("objectClass"));
        assert!(!p.has_index_on("sn"));
    }

    #[test]
    fn identity_frozen_once_initialized() {
        let p = partition();
        p.set_id("other").unwrap();
        p.set_cache_size(5).unwrap();
        p.initialize().unwrap();
        assert!(matches!(p.set_id("again"), Err(CoreError::IllegalState { .. })));
        assert!(matches!(
            p.set_suffix_dn(Dn::parse("dc=x").unwrap()),
            Err(CoreError::IllegalState { .. })
        ));
        assert!(p.add_index("sn", 10).is_err());
        assert!(p.set_partition_path("/tmp/x").is_err());
        assert_eq!(p.id(), "other");
        assert_eq!(p.cache_size(), 5);
    }

    #[test]
    fn unknown_indexed_attribute_fails_init_and_cleans_up() {
        let config = PartitionConfig::new("bad", Dn::parse("dc=test").unwrap()).index("nosuchattr");
        let p = StorePartition::from_config(Arc::new(Schema::core()), config);
        assert!(matches!(p.initialize(), Err(CoreError::SchemaViolation { .. })));
        assert!(!p.is_initialized());
        assert!(p.stores.read().is_none());
    }

    #[test]
    fn init_failpoint_fails_init() {
        let config = PartitionConfig::new("fp", Dn::parse("dc=test").unwrap()).failpoint(failpoint::INIT);
        let p = StorePartition::from_config(Arc::new(Schema::core()), config);
        assert!(p.initialize().is_err());
        p.failpoints().disarm(failpoint::INIT);
        p.initialize().unwrap();
        assert!(p.is_initialized());
    }

    #[test]
    fn apply_and_revert_restore_dump() {
        let p = partition();
        p.initialize().unwrap();
        let before = p.dump().unwrap();
        let id = EntryId::new();
        let applied = p.apply(&entry_edit(id), DataVersion::new(1)).unwrap();
        assert!(p.master_table().unwrap().get(id, DataVersion::new(1)).is_some());
        p.revert(applied).unwrap();
        assert_eq!(p.dump().unwrap(), before);
    }

    #[test]
    fn stale_binding_rejected_after_reinit() {
        let p = partition();
        p.initialize().unwrap();
        let edit = LogEdit::Index(IndexModification::new(
            EditSequence(1),
            &IndexId::System(SystemIndex::Presence),
            IndexKey::value("2.5.4.3"),
            EntryId::new(),
            IndexChange::Add,
        ));
        let stale = edit.clone().activate(&p).unwrap();
        p.destroy().unwrap();
        p.initialize().unwrap();
        assert!(matches!(
            p.apply(&stale, DataVersion::new(1)),
            Err(CoreError::IllegalState { .. })
        ));
        let fresh = edit.activate(&p).unwrap();
        assert!(p.apply(&fresh, DataVersion::new(1)).is_ok());
    }

    #[test]
    fn apply_failpoint_countdown() {
        let p = partition();
        p.initialize().unwrap();
        p.failpoints().fail_apply_after(1);
        assert!(p.apply(&entry_edit(EntryId::new()), DataVersion::new(1)).is_ok());
        assert!(matches!(
            p.apply(&entry_edit(EntryId::new()), DataVersion::new(1)),
            Err(CoreError::StorageFailure { .. })
        ));
    }

    #[test]
    fn dump_index_lists_pairs() {
        let p = partition();
        p.initialize().unwrap();
        let id = EntryId::new();
        p.user_index("cn")
            .unwrap()
            .apply(&IndexKey::value("x"), id, true, DataVersion::new(1));
        let mut out = Vec::new();
        p.dump_index(&mut out, "cn").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&id.to_string()));
        assert!(text.contains("v1+"));

        let mut out = Vec::new();
        p.dump_index(&mut out, "sn").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Nothing to dump for index sn\n");
    }
}
