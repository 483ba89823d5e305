//! Test fixtures and directory helpers.
//!
//! A [`TestDirectory`] is a [`Directory`] with one registered partition
//! under [`SUFFIX`], user indices on `cn` and `uid`, and a small seeded
//! tree:
//!
//! ```text
//! dc=example,dc=com
//! ├── ou=people
//! └── ou=groups
//! ```

use ditstore_core::{
    AddContext, Config, DeleteContext, Directory, Dn, Entry, EntryId, LookupContext, OperationExecutionManager,
    Partition, PartitionConfig, RecoveryReport, Schema, StorePartition,
};
use ditstore_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Suffix of the test partition.
pub const SUFFIX: &str = "dc=example,dc=com";

/// Id of the test partition.
pub const PARTITION: &str = "example";

/// Name of the log file inside a file-backed fixture's directory.
pub const LOG_FILE: &str = "ditstore.log";

/// Parses a Dn, panicking on bad input.
pub fn dn(text: &str) -> Dn {
    Dn::parse(text).unwrap_or_else(|e| panic!("bad test dn {text:?}: {e}"))
}

/// Leaf value of a Dn's Rdn.
fn leaf_value(name: &Dn) -> String {
    name.rdn().map(|r| r.value().to_string()).unwrap_or_default()
}

/// A `person` named by `dn`, with `sn` copied from the Rdn value.
pub fn person(dn_text: &str) -> Entry {
    let name = dn(dn_text);
    let sn = leaf_value(&name);
    Entry::new(name)
        .with("objectClass", ["top", "person"])
        .with("sn", [sn])
}

/// An `organizationalUnit` named by `dn`.
pub fn ou(dn_text: &str) -> Entry {
    Entry::new(dn(dn_text)).with("objectClass", ["top", "organizationalUnit"])
}

/// An `alias` named by `dn` pointing at `target`.
pub fn alias(dn_text: &str, target: &str) -> Entry {
    Entry::new(dn(dn_text))
        .with("objectClass", ["top", "alias", "extensibleObject"])
        .with("aliasedObjectName", [target])
}

/// A `referral` named by `dn`.
pub fn referral(dn_text: &str, url: &str) -> Entry {
    Entry::new(dn(dn_text))
        .with("objectClass", ["top", "referral", "extensibleObject"])
        .with("ref", [url])
}

/// The partition configuration every fixture uses.
pub fn partition_config() -> PartitionConfig {
    PartitionConfig::new(PARTITION, dn(SUFFIX)).index("cn").index("uid")
}

/// A test directory with automatic cleanup.
pub struct TestDirectory {
    /// The directory instance.
    pub dir: Directory,
    /// The registered partition.
    pub partition: Arc<dyn Partition>,
    /// Same partition, concretely typed.
    pub store: Arc<StorePartition>,
    /// What recovery reported when the fixture opened.
    pub report: RecoveryReport,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDirectory {
    /// In-memory directory with the seeded tree.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// In-memory directory with the seeded tree and custom settings.
    pub fn memory_with(config: Config) -> Self {
        let fixture = Self::open(Box::new(InMemoryBackend::new()), config, None);
        fixture.seed();
        fixture
    }

    /// In-memory directory with no entries at all.
    pub fn empty() -> Self {
        Self::open(Box::new(InMemoryBackend::new()), Config::default(), None)
    }

    /// File-backed directory with the seeded tree.
    pub fn file() -> Self {
        Self::file_with(|backend| Box::new(backend))
    }

    /// File-backed directory whose backend is wrapped by `wrap` first.
    pub fn file_with(wrap: impl FnOnce(FileBackend) -> Box<dyn StorageBackend>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let backend = FileBackend::open(&temp_dir.path().join(LOG_FILE)).expect("failed to open log file");
        let fixture = Self::open(wrap(backend), Config::default(), Some(temp_dir));
        fixture.seed();
        fixture
    }

    /// Drops the directory and opens a fresh one over the same log file.
    ///
    /// # Panics
    ///
    /// For in-memory fixtures.
    pub fn reopen(self) -> Self {
        let Self { dir, temp_dir, .. } = self;
        let temp_dir = temp_dir.expect("only file-backed fixtures can be reopened");
        drop(dir);
        let backend = FileBackend::open(&temp_dir.path().join(LOG_FILE)).expect("failed to reopen log file");
        Self::open(Box::new(backend), Config::default(), Some(temp_dir))
    }

    fn open(backend: Box<dyn StorageBackend>, config: Config, temp_dir: Option<TempDir>) -> Self {
        let schema = Arc::new(Schema::core());
        let dir = Directory::open(backend, schema.clone(), config);
        let store = Arc::new(StorePartition::from_config(schema, partition_config()));
        let partition: Arc<dyn Partition> = store.clone();
        dir.add_partition(Arc::clone(&partition)).expect("failed to register partition");
        let report = dir.recover().expect("recovery failed");
        Self {
            dir,
            partition,
            store,
            report,
            temp_dir,
        }
    }

    fn seed(&self) {
        let context = Entry::new(dn(SUFFIX)).with("objectClass", ["top", "domain"]);
        self.add(context);
        self.add(ou(&format!("ou=people,{SUFFIX}")));
        self.add(ou(&format!("ou=groups,{SUFFIX}")));
    }

    /// Path of the log file, for file-backed fixtures.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(LOG_FILE))
    }

    /// Working directory, for file-backed fixtures.
    pub fn work_dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// The operation manager.
    pub fn ops(&self) -> &OperationExecutionManager {
        self.dir.operations()
    }

    /// Adds `entry`, panicking on failure.
    pub fn add(&self, entry: Entry) -> EntryId {
        let name = entry.dn().to_string();
        self.ops()
            .add(&self.partition, &AddContext::new(entry))
            .unwrap_or_else(|e| panic!("add {name} failed: {e}"))
    }

    /// Deletes `dn`, panicking on failure.
    pub fn delete(&self, dn_text: &str) {
        self.ops()
            .delete(&self.partition, &DeleteContext::new(dn(dn_text)))
            .unwrap_or_else(|e| panic!("delete {dn_text} failed: {e}"));
    }

    /// Looks `dn` up, `None` when it does not exist.
    pub fn lookup(&self, dn_text: &str) -> Option<Entry> {
        self.ops()
            .lookup(&self.partition, &LookupContext::new(dn(dn_text)))
            .ok()
    }

    /// True if `dn` exists.
    pub fn exists(&self, dn_text: &str) -> bool {
        self.ops()
            .has_entry(&self.partition, &dn(dn_text))
            .expect("has_entry failed")
    }

    /// Current Dn of the entry with `id`.
    pub fn dn_of(&self, id: EntryId) -> Option<Dn> {
        self.ops()
            .lookup_by_id(&self.partition, id)
            .expect("lookup_by_id failed")
            .map(|e| e.dn().clone())
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> usize {
        let version = self.dir.transactions().logical_data_version();
        self.partition
            .master_table()
            .expect("master table")
            .count(version)
    }

    /// Panics with every inconsistency the verifier finds.
    pub fn assert_consistent(&self) {
        let problems = self.dir.verify(PARTITION).expect("verify failed");
        assert!(
            problems.is_empty(),
            "index inconsistencies:\n{}",
            problems.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
        );
    }
}

impl std::ops::Deref for TestDirectory {
    type Target = Directory;

    fn deref(&self) -> &Self::Target {
        &self.dir
    }
}

/// Runs a test with a seeded in-memory directory.
pub fn with_test_directory<F, R>(f: F) -> R
where
    F: FnOnce(&TestDirectory) -> R,
{
    let fixture = TestDirectory::memory();
    f(&fixture)
}
