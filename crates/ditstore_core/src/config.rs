//! Engine and partition configuration.

use crate::name::Dn;
use std::collections::HashSet;
use std::path::PathBuf;

/// Transaction engine settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sync the log backend on every commit instead of only flushing.
    pub sync_on_commit: bool,

    /// How many times an implicit transaction is re-run after losing a
    /// commit-time conflict.
    pub max_conflict_retries: u32,

    /// Drop versions no live snapshot can see after each commit.
    pub prune_on_commit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            max_conflict_retries: 3,
            prune_on_commit: true,
        }
    }
}

impl Config {
    /// Default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether commits sync the log.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the implicit-transaction retry budget.
    #[must_use]
    pub const fn max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Sets whether commits prune old versions.
    #[must_use]
    pub const fn prune_on_commit(mut self, value: bool) -> Self {
        self.prune_on_commit = value;
        self
    }
}

/// A user index to build on a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Attribute name or OID.
    pub attribute: String,
    /// Cache size hint.
    pub cache_size: usize,
}

/// Identity and layout of one partition.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Partition id, unique within a directory.
    pub id: String,
    /// Suffix Dn.
    pub suffix: Dn,
    /// Entry cache size hint.
    pub cache_size: usize,
    /// Working directory, if the partition keeps files.
    pub path: Option<PathBuf>,
    /// User indices.
    pub indexed_attributes: Vec<IndexConfig>,
    /// Named failpoints armed from the start.
    pub failpoints: HashSet<String>,
}

impl PartitionConfig {
    /// Default cache size hint.
    pub const DEFAULT_CACHE_SIZE: usize = 10_000;

    /// Partition `id` rooted at `suffix`.
    pub fn new(id: impl Into<String>, suffix: Dn) -> Self {
        Self {
            id: id.into(),
            suffix,
            cache_size: Self::DEFAULT_CACHE_SIZE,
            path: None,
            indexed_attributes: Vec::new(),
            failpoints: HashSet::new(),
        }
    }

    /// Sets the cache size hint.
    #[must_use]
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Adds a user index with the partition's cache size.
    #[must_use]
    pub fn index(mut self, attribute: &str) -> Self {
        let cache_size = self.cache_size;
        self.indexed_attributes.push(IndexConfig {
            attribute: attribute.to_string(),
            cache_size,
        });
        self
    }

    /// Arms a failpoint.
    #[must_use]
    pub fn failpoint(mut self, name: &str) -> Self {
        self.failpoints.insert(name.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.sync_on_commit);
        assert_eq!(config.max_conflict_retries, 3);
        assert!(config.prune_on_commit);
    }

    #[test]
    fn config_builder() {
        let config = Config::new()
            .sync_on_commit(false)
            .max_conflict_retries(0)
            .prune_on_commit(false);
        assert!(!config.sync_on_commit);
        assert_eq!(config.max_conflict_retries, 0);
        assert!(!config.prune_on_commit);
    }

    #[test]
    fn partition_builder() {
        let config = PartitionConfig::new("test", Dn::parse("dc=test").unwrap())
            .cache_size(50)
            .index("cn")
            .index("uid")
            .failpoint("apply");
        assert_eq!(config.indexed_attributes.len(), 2);
        assert_eq!(config.indexed_attributes[0].cache_size, 50);
        assert!(config.failpoints.contains("apply"));
        assert!(config.path.is_none());
    }
}
