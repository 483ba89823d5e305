use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of attribute delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationOp {
    /// Add values (`ADD_ATTRIBUTE`).
    Add,
    /// Remove values, or the whole attribute when no values are given
    /// (`REMOVE_ATTRIBUTE`).
    Remove,
    /// Replace every value (`REPLACE_ATTRIBUTE`).
    Replace,
}

impl fmt::Display for ModificationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Remove => "delete",
            Self::Replace => "replace",
        })
    }
}

/// One ordered attribute delta of a modify request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    /// Delta kind.
    pub op: ModificationOp,
    /// Attribute id.
    pub attribute: String,
    /// Values involved.
    pub values: Vec<String>,
}

impl Modification {
    fn build<I, V>(op: ModificationOp, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            op,
            attribute: attribute.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Add delta.
    pub fn add<I, V>(attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::build(ModificationOp::Add, attribute, values)
    }

    /// Remove delta.
    pub fn remove<I, V>(attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::build(ModificationOp::Remove, attribute, values)
    }

    /// Remove-whole-attribute delta.
    #[must_use]
    pub fn remove_all(attribute: &str) -> Self {
        Self::build(ModificationOp::Remove, attribute, Vec::<String>::new())
    }

    /// Replace delta.
    pub fn replace<I, V>(attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::build(ModificationOp::Replace, attribute, values)
    }
}

impl fmt::Display for Modification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.op, self.attribute, self.values)
    }
}
