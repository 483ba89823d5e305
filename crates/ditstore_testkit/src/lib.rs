//! # ditstore testkit
//!
//! Test utilities for ditstore.
//!
//! This crate provides:
//! - Directory fixtures over memory or file logs, with a seeded tree
//! - Entry builders for the standard object classes
//! - Property-based generators for names and operation scripts
//! - A failure-injecting storage backend for crash tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ditstore_testkit::prelude::*;
//!
//! #[test]
//! fn adds_a_person() {
//!     let t = TestDirectory::memory();
//!     t.add(person("cn=ann,ou=people,dc=example,dc=com"));
//!     t.assert_consistent();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
