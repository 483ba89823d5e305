//! Entry identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable 128-bit identifier of an entry.
///
/// Assigned once at add time and unaffected by renames and moves. Ordering
/// is bytewise, which makes [`EntryId::MIN`] and [`EntryId::MAX`] usable as
/// range bounds inside composite index keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId([u8; 16]);

impl EntryId {
    /// Smallest id.
    pub const MIN: Self = Self([0; 16]);

    /// Largest id.
    pub const MAX: Self = Self([0xff; 16]);

    /// Sentinel parent of every partition's context entry. Never names a
    /// stored entry.
    pub const ROOT: Self = Self::MIN;

    /// Id given to a partition's context entry
    /// (`00000000-0000-0000-0000-000000000001`).
    pub const DEFAULT: Self = Self([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    /// Fresh random (v4) id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// As a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    /// Parses the hyphenated UUID form.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text).ok().map(|u| Self(u.into_bytes()))
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.to_uuid())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl From<Uuid> for EntryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_differ_from_reserved() {
        let id = EntryId::new();
        assert_ne!(id, EntryId::ROOT);
        assert_ne!(id, EntryId::DEFAULT);
        assert_ne!(id, EntryId::new());
    }

    #[test]
    fn reserved_ids_bound_the_range() {
        assert!(EntryId::MIN <= EntryId::ROOT);
        assert!(EntryId::DEFAULT < EntryId::MAX);
        assert_eq!(EntryId::DEFAULT.to_string(), "00000000-0000-0000-0000-000000000001");
    }

    #[test]
    fn parse_accepts_display_form() {
        let id = EntryId::new();
        assert_eq!(EntryId::parse(&id.to_string()), Some(id));
        assert_eq!(EntryId::parse("nope"), None);
    }
}
