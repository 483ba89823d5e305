use super::rdn::Rdn;
use super::split_unescaped;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A distinguished name.
///
/// Stored leaf first. The empty Dn names the root of the whole tree and is
/// never the name of a stored entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    rdns: Vec<Rdn>,
    norm: String,
}

impl Dn {
    /// The empty name.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses the textual form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDn`] on a syntax error.
    pub fn parse(text: &str) -> CoreResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::root());
        }
        let rdns = split_unescaped(text, ',')
            .into_iter()
            .map(Rdn::parse_inner)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| CoreError::InvalidDn {
                dn: text.to_string(),
                reason,
            })?;
        Ok(Self::from_rdns(rdns))
    }

    /// Builds a name from leaf-first components.
    #[must_use]
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let norm = rdns.iter().map(Rdn::normalized).collect::<Vec<_>>().join(",");
        Self { rdns, norm }
    }

    /// Components, leaf first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    /// True for the empty name.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Leaf component.
    #[must_use]
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Name of the parent, `None` for the empty name.
    #[must_use]
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Self::from_rdns(self.rdns[1..].to_vec()))
        }
    }

    /// Name of a child of this entry.
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Same parent, different leaf.
    #[must_use]
    pub fn with_rdn(&self, rdn: Rdn) -> Dn {
        match self.parent() {
            Some(parent) => parent.child(rdn),
            None => Self::from_rdns(vec![rdn]),
        }
    }

    /// Normalized text.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.norm
    }

    /// True when `ancestor` is a proper prefix of this name (counting from
    /// the root side).
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.len() > ancestor.len() && self.ends_with(ancestor)
    }

    /// Like [`is_descendant_of`](Self::is_descendant_of) but also true for
    /// equal names.
    #[must_use]
    pub fn is_descendant_or_self(&self, ancestor: &Dn) -> bool {
        self.len() >= ancestor.len() && self.ends_with(ancestor)
    }

    fn ends_with(&self, ancestor: &Dn) -> bool {
        let skip = self.len() - ancestor.len();
        self.rdns[skip..]
            .iter()
            .zip(&ancestor.rdns)
            .all(|(a, b)| a == b)
    }

    /// Components below `ancestor`, leaf first. `None` when `ancestor` is
    /// not a prefix.
    #[must_use]
    pub fn relative_to(&self, ancestor: &Dn) -> Option<&[Rdn]> {
        if self.is_descendant_or_self(ancestor) {
            Some(&self.rdns[..self.len() - ancestor.len()])
        } else {
            None
        }
    }

    /// Replaces the `old` prefix with `new`. `None` when this name is not at
    /// or below `old`.
    #[must_use]
    pub fn rebase(&self, old: &Dn, new: &Dn) -> Option<Dn> {
        let below = self.relative_to(old)?;
        let mut rdns = below.to_vec();
        rdns.extend(new.rdns.iter().cloned());
        Some(Self::from_rdns(rdns))
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.norm.cmp(&other.norm)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.to_string()
    }
}
