//! Storage errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for backend calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures raised by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The operating system reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read touched bytes past the end of the store.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: usize,
        /// Store size at the time of the read.
        size: u64,
    },

    /// Truncation was asked to grow the store.
    #[error("cannot truncate to {requested} bytes, store holds {size}")]
    InvalidTruncate {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// Another process holds the lock on this file.
    #[error("storage file is locked by another process: {}", path.display())]
    Locked {
        /// Path of the locked file.
        path: PathBuf,
    },

    /// The backend refused the call because it was shut down or failed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
