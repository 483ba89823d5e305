//! Entries, their attributes and attribute-level modifications.

mod id;
mod modification;

pub use id::EntryId;
pub use modification::{Modification, ModificationOp};

use crate::name::Dn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One attribute of an entry: its id as written and its values in insertion
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    id: String,
    values: Vec<String>,
}

impl Attribute {
    /// Creates an attribute.
    pub fn new<I, V>(id: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Attribute id as written.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Values.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// True if no values remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Exact (not normalized) membership test.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub(crate) fn values_mut(&mut self) -> &mut Vec<String> {
        &mut self.values
    }
}

/// A directory entry.
///
/// Attribute ids are matched case-insensitively. The entry carries its
/// current Dn; the stable id lives beside it in the master table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    dn: Dn,
    attributes: BTreeMap<String, Attribute>,
}

impl Entry {
    /// Empty entry named `dn`.
    #[must_use]
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder form of [`add_values`](Self::add_values).
    #[must_use]
    pub fn with<I, V>(mut self, id: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.add_values(id, values);
        self
    }

    /// Current name.
    #[must_use]
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Renames the in-memory entry.
    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    /// Looks up an attribute by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Attribute> {
        self.attributes.get(&key(id))
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(&key(id))
    }

    /// Values of an attribute, empty if absent.
    #[must_use]
    pub fn values(&self, id: &str) -> &[String] {
        self.get(id).map_or(&[], Attribute::values)
    }

    /// True if the attribute is present.
    #[must_use]
    pub fn contains_attribute(&self, id: &str) -> bool {
        self.attributes.contains_key(&key(id))
    }

    /// Appends values, skipping exact duplicates. Creates the attribute if
    /// needed.
    pub fn add_values<I, V>(&mut self, id: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let attr = self
            .attributes
            .entry(key(id))
            .or_insert_with(|| Attribute::new(id, Vec::<String>::new()));
        for value in values {
            let value = value.into();
            if !attr.contains(&value) {
                attr.values.push(value);
            }
        }
    }

    /// Replaces all values. An empty list removes the attribute.
    pub fn put<I, V>(&mut self, id: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let attr = Attribute::new(id, values);
        if attr.is_empty() {
            self.attributes.remove(&key(id));
        } else {
            self.attributes.insert(key(id), attr);
        }
    }

    /// Removes an attribute and returns it.
    pub fn remove_attribute(&mut self, id: &str) -> Option<Attribute> {
        self.attributes.remove(&key(id))
    }

    /// Attributes in id order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// True when the entry holds no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Case-insensitive objectClass membership.
    #[must_use]
    pub fn has_object_class(&self, class: &str) -> bool {
        self.values("objectClass")
            .iter()
            .any(|v| v.trim().eq_ignore_ascii_case(class))
    }

    /// True for entries of class `alias`.
    #[must_use]
    pub fn is_alias(&self) -> bool {
        self.has_object_class("alias")
    }

    /// True for entries of class `referral`.
    #[must_use]
    pub fn is_referral(&self) -> bool {
        self.has_object_class("referral")
    }

    /// Copy restricted to the named attributes. `*` or an empty selection
    /// keeps everything.
    #[must_use]
    pub fn project(&self, selection: &[String]) -> Entry {
        if selection.is_empty() || selection.iter().any(|s| s == "*") {
            return self.clone();
        }
        let wanted: Vec<String> = selection.iter().map(|s| key(s)).collect();
        Entry {
            dn: self.dn.clone(),
            attributes: self
                .attributes
                .iter()
                .filter(|(k, _)| wanted.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

fn key(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Entry {
        Entry::new(Dn::parse("cn=x,dc=test").unwrap())
            .with("objectClass", ["top", "person"])
            .with("cn", ["x"])
            .with("sn", ["x"])
    }

    #[test]
    fn attribute_ids_are_case_insensitive() {
        let entry = person();
        assert_eq!(entry.values("SN"), ["x"]);
        assert!(entry.contains_attribute("objectclass"));
        assert!(entry.has_object_class("PERSON"));
    }

    #[test]
    fn add_values_skips_exact_duplicates() {
        let mut entry = person();
        entry.add_values("cn", ["x", "y"]);
        assert_eq!(entry.values("cn"), ["x", "y"]);
    }

    #[test]
    fn put_empty_removes() {
        let mut entry = person();
        entry.put("sn", Vec::<String>::new());
        assert!(!entry.contains_attribute("sn"));
    }

    #[test]
    fn project_keeps_selected() {
        let entry = person();
        let only = entry.project(&["SN".to_string()]);
        assert_eq!(only.len(), 1);
        assert_eq!(only.dn(), entry.dn());
        assert_eq!(entry.project(&["*".to_string()]), entry);
    }

    #[test]
    fn alias_detection() {
        let alias = Entry::new(Dn::parse("cn=a,dc=test").unwrap()).with("objectClass", ["top", "alias"]);
        assert!(alias.is_alias());
        assert!(!person().is_alias());
    }
}
