use super::store::StorePartition;
use super::Partition;
use crate::config::PartitionConfig;
use crate::error::CoreResult;
use crate::name::Dn;
use crate::schema::SchemaAuthority;
use std::path::Path;
use std::sync::Arc;

/// Builds partitions for a server bootstrap.
pub trait PartitionFactory {
    /// Partition type produced.
    type Output: Partition;

    /// Creates an uninitialized partition whose working path is
    /// `working_dir/<id>`.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn create_partition(
        &self,
        schema: Arc<dyn SchemaAuthority>,
        id: &str,
        suffix: Dn,
        cache_size: usize,
        working_dir: &Path,
    ) -> CoreResult<Self::Output>;

    /// Adds a user index before initialization.
    ///
    /// # Errors
    ///
    /// [`CoreError`](crate::CoreError)`::IllegalState` if already initialized.
    fn add_index(&self, partition: &Self::Output, attribute: &str, cache_size: usize) -> CoreResult<()>;
}

/// Factory for [`StorePartition`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StorePartitionFactory;

impl PartitionFactory for StorePartitionFactory {
    type Output = StorePartition;

    fn create_partition(
        &self,
        schema: Arc<dyn SchemaAuthority>,
        id: &str,
        suffix: Dn,
        cache_size: usize,
        working_dir: &Path,
    ) -> CoreResult<StorePartition> {
        let config = PartitionConfig::new(id, suffix)
            .cache_size(cache_size)
            .path(working_dir.join(id));
        Ok(StorePartition::from_config(schema, config))
    }

    fn add_index(&self, partition: &StorePartition, attribute: &str, cache_size: usize) -> CoreResult<()> {
        partition.add_index(attribute, cache_size)
    }
}
