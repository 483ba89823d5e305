//! # ditstore storage
//!
//! Byte-store backends underneath the ditstore durability log.
//!
//! A backend is an append-only sequence of bytes. It never looks inside
//! what it stores: record framing, checksums and replay all belong to
//! `ditstore_core`.
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] keeps the bytes in a vector. Used by tests and by
//!   directories that do not need to survive a restart.
//! - [`FileBackend`] appends to a file and holds an exclusive advisory lock
//!   on it for as long as it is open, so two processes never write the same
//!   log.
//!
//! ```rust
//! use ditstore_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut log = InMemoryBackend::new();
//! let at = log.append(b"record").unwrap();
//! assert_eq!(log.read_at(at, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
