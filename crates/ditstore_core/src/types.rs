//! Small identifier types shared across modules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a transaction.
///
/// Allocated from a counter owned by the transaction manager; never reused
/// within one log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a transaction id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Logical data version.
///
/// Bumped once per committed write transaction. A snapshot at version `v`
/// sees every commit stamped `<= v` and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct DataVersion(pub u64);

impl DataVersion {
    /// Version of an empty directory.
    pub const INITIAL: Self = Self(0);

    /// Creates a version.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The following version.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for DataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Creation-time position of a log edit. Replay applies edits in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EditSequence(pub u64);

impl EditSequence {
    /// Raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EditSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// The directory operations, used to label errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Add an entry.
    Add,
    /// Delete a leaf entry.
    Delete,
    /// Change attributes.
    Modify,
    /// Change the Rdn.
    Rename,
    /// Change the parent.
    Move,
    /// Change parent and Rdn together.
    MoveAndRename,
    /// Point read.
    Lookup,
}

impl OperationKind {
    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::Rename => "rename",
            Self::Move => "move",
            Self::MoveAndRename => "moveAndRename",
            Self::Lookup => "lookup",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_order_and_advance() {
        let v = DataVersion::INITIAL;
        assert!(v < v.next());
        assert_eq!(v.next().next().as_u64(), 2);
        assert_eq!(DataVersion::new(7).to_string(), "v7");
    }

    #[test]
    fn transaction_id_display() {
        assert_eq!(TransactionId::new(3).to_string(), "txn:3");
    }

    #[test]
    fn operation_names() {
        assert_eq!(OperationKind::MoveAndRename.to_string(), "moveAndRename");
    }
}
