//! # ditstore core
//!
//! Transactional storage core for a hierarchical (LDAP-style) directory.
//!
//! This crate provides:
//! - Distinguished names, entries and the schema authority seam
//! - Versioned master tables and indices that serve snapshot reads
//! - The log edit model: every change is an invertible edit
//! - A durable log and replay on startup
//! - The transaction manager with optimistic, commit-time conflict checks
//! - The operation execution manager: add, delete, modify, rename, move,
//!   move-and-rename and lookup
//! - A consistency verifier for master table and indices
//!
//! ## Example
//!
//! ```rust
//! use ditstore_core::{AddContext, Config, Directory, Dn, Entry, LookupContext, Schema, StorePartition};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(Schema::core());
//! let dir = Directory::open_in_memory(schema.clone(), Config::default());
//! let suffix = Dn::parse("dc=example,dc=com").unwrap();
//! dir.add_partition(Arc::new(StorePartition::new(schema, "example", suffix.clone())))
//!     .unwrap();
//! dir.recover().unwrap();
//!
//! let part = dir.partition("example").unwrap();
//! let ops = dir.operations();
//! let context = Entry::new(suffix.clone()).with("objectClass", ["top", "domain"]);
//! ops.add(&part, &AddContext::new(context)).unwrap();
//!
//! let found = ops.lookup(&part, &LookupContext::new(suffix)).unwrap();
//! assert_eq!(found.values("dc"), ["example"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod directory;
mod entry;
mod error;
pub mod index;
pub mod logedit;
mod name;
pub mod operation;
pub mod partition;
mod recovery;
pub mod schema;
pub mod store;
pub mod txn;
mod types;
pub mod wal;

pub use config::{Config, IndexConfig, PartitionConfig};
pub use directory::Directory;
pub use entry::{Attribute, Entry, EntryId, Modification, ModificationOp};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use name::{normalize_value, Ava, Dn, Rdn};
pub use operation::{
    AddContext, DeleteContext, LookupContext, ModifyContext, MoveAndRenameContext, MoveContext,
    OperationExecutionManager, RenameContext,
};
pub use partition::{
    Capabilities, Inconsistency, Partition, PartitionFactory, StorePartition, StorePartitionFactory,
};
pub use recovery::{recover, RecoveryReport};
pub use schema::{Schema, SchemaAuthority};
pub use txn::{Transaction, TransactionHandle, TransactionManager, TransactionMode, TransactionState};
pub use types::{DataVersion, EditSequence, OperationKind, TransactionId};
