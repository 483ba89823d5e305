//! Operation request contexts.

use crate::entry::{Entry, EntryId, Modification};
use crate::name::{Dn, Rdn};

/// Add one entry.
#[derive(Debug, Clone)]
pub struct AddContext {
    /// Entry to add, named by its Dn.
    pub entry: Entry,
}

impl AddContext {
    /// Context for `entry`.
    #[must_use]
    pub fn new(entry: Entry) -> Self {
        Self { entry }
    }
}

/// Delete one leaf entry.
#[derive(Debug, Clone)]
pub struct DeleteContext {
    /// Entry to delete.
    pub dn: Dn,
    /// When set, the Dn must resolve to this id.
    pub id: Option<EntryId>,
}

impl DeleteContext {
    /// Context for `dn`.
    #[must_use]
    pub fn new(dn: Dn) -> Self {
        Self { dn, id: None }
    }

    /// Also requires the entry to carry `id`.
    #[must_use]
    pub fn with_id(mut self, id: EntryId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Apply ordered attribute deltas.
#[derive(Debug, Clone)]
pub struct ModifyContext {
    /// Entry to modify.
    pub dn: Dn,
    /// Deltas, applied in order.
    pub modifications: Vec<Modification>,
}

impl ModifyContext {
    /// Context for `dn`.
    #[must_use]
    pub fn new(dn: Dn, modifications: Vec<Modification>) -> Self {
        Self { dn, modifications }
    }
}

/// Change the leaf Rdn of an entry.
#[derive(Debug, Clone)]
pub struct RenameContext {
    /// Entry to rename.
    pub dn: Dn,
    /// New leaf.
    pub new_rdn: Rdn,
    /// Remove old Rdn values not in the new Rdn.
    pub delete_old_rdn: bool,
}

impl RenameContext {
    /// Context for `dn`.
    #[must_use]
    pub fn new(dn: Dn, new_rdn: Rdn, delete_old_rdn: bool) -> Self {
        Self {
            dn,
            new_rdn,
            delete_old_rdn,
        }
    }
}

/// Move an entry and its subtree under a new parent.
#[derive(Debug, Clone)]
pub struct MoveContext {
    /// Entry to move.
    pub dn: Dn,
    /// New parent.
    pub new_superior: Dn,
}

impl MoveContext {
    /// Context for `dn`.
    #[must_use]
    pub fn new(dn: Dn, new_superior: Dn) -> Self {
        Self { dn, new_superior }
    }
}

/// Move and rename in one step.
#[derive(Debug, Clone)]
pub struct MoveAndRenameContext {
    /// Entry to move.
    pub dn: Dn,
    /// New parent.
    pub new_superior: Dn,
    /// New leaf.
    pub new_rdn: Rdn,
    /// Remove old Rdn values not in the new Rdn.
    pub delete_old_rdn: bool,
}

impl MoveAndRenameContext {
    /// Context for `dn`.
    #[must_use]
    pub fn new(dn: Dn, new_superior: Dn, new_rdn: Rdn, delete_old_rdn: bool) -> Self {
        Self {
            dn,
            new_superior,
            new_rdn,
            delete_old_rdn,
        }
    }
}

/// Read one entry.
#[derive(Debug, Clone)]
pub struct LookupContext {
    /// Entry to read.
    pub dn: Dn,
    /// Attributes to return; empty or `*` means all.
    pub attributes: Vec<String>,
}

impl LookupContext {
    /// Context returning every attribute.
    #[must_use]
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: Vec::new(),
        }
    }

    /// Restricts the returned attributes.
    #[must_use]
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}
