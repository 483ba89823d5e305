//! The backend trait.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// Offsets returned by [`append`](StorageBackend::append) stay valid until the
/// store is truncated below them. Everything appended before a successful
/// [`flush`](StorageBackend::flush) must be readable after a restart for
/// persistent implementations.
pub trait StorageBackend: Send + Sync {
    /// Reads exactly `len` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// [`StorageError::ReadPastEnd`](crate::StorageError::ReadPastEnd) when
    /// the range is not fully inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered appends to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Current length in bytes, which is also the next append offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Flushes and forces data and metadata to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte at or after `new_size`.
    ///
    /// # Errors
    ///
    /// Fails when `new_size` is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
