//! Versioned storage primitives.
//!
//! The master table and every index sit on [`VersionedMap`], an ordered map
//! whose keys carry version chains. Writers stamp slots with the version
//! they are committing; readers pass the snapshot version they started at.

mod master;
mod versioned;

pub use master::MasterTable;
pub use versioned::{Chain, Prior, VersionedMap};
