//! Schema authority.
//!
//! Loading schema definitions is somebody else's job. The core only asks a
//! [`SchemaAuthority`] what an attribute or object class is. [`Schema`] is
//! an in-memory registry and [`Schema::core`] bootstraps it with the
//! standard definitions needed to run a directory.

mod registry;

pub use registry::Schema;

use crate::error::{CoreError, CoreResult};
use crate::name::{normalize_value, Dn};
use std::fmt;

/// Answers schema questions for the operation engine.
pub trait SchemaAuthority: Send + Sync + fmt::Debug {
    /// Attribute type by name or OID, case-insensitive.
    fn attribute_type(&self, name: &str) -> Option<&AttributeType>;

    /// Object class by name or OID, case-insensitive.
    fn object_class(&self, name: &str) -> Option<&ObjectClass>;

    /// MUST attributes of `class` and all of its superiors, as canonical
    /// attribute names.
    fn required_attributes(&self, class: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut pending = vec![class.to_string()];
        let mut seen = Vec::new();
        while let Some(next) = pending.pop() {
            let Some(oc) = self.object_class(&next) else {
                continue;
            };
            if seen.contains(&oc.oid) {
                continue;
            }
            seen.push(oc.oid.clone());
            for must in &oc.must {
                let name = self
                    .attribute_type(must)
                    .map_or_else(|| must.clone(), |at| at.name().to_string());
                if !out.contains(&name) {
                    out.push(name);
                }
            }
            pending.extend(oc.superiors.iter().cloned());
        }
        out
    }
}

/// Equality matching rule used to normalize values into index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingRule {
    /// Trim, collapse inner whitespace, lowercase.
    CaseIgnore,
    /// Trim and collapse inner whitespace.
    CaseExact,
    /// Distinguished name comparison.
    DistinguishedName,
    /// Decimal integer comparison.
    Integer,
    /// Byte-for-byte comparison.
    OctetString,
}

impl MatchingRule {
    /// Normalized form of `value` under this rule.
    ///
    /// # Errors
    ///
    /// [`CoreError::SchemaViolation`] when the value is not valid for the
    /// rule's syntax.
    pub fn normalize(self, value: &str) -> CoreResult<String> {
        match self {
            Self::CaseIgnore => Ok(normalize_value(value)),
            Self::CaseExact => Ok(value.split_whitespace().collect::<Vec<_>>().join(" ")),
            Self::DistinguishedName => Dn::parse(value)
                .map(|dn| dn.normalized().to_string())
                .map_err(|e| CoreError::schema_violation(e.to_string())),
            Self::Integer => value
                .trim()
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|_| CoreError::schema_violation(format!("{value:?} is not an integer"))),
            Self::OctetString => Ok(value.to_string()),
        }
    }
}

/// An attribute type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeType {
    /// Numeric OID.
    pub oid: String,
    /// Names, first is canonical.
    pub names: Vec<String>,
    /// Equality rule.
    pub equality: MatchingRule,
    /// At most one value allowed.
    pub single_valued: bool,
    /// Clients may change it with modify.
    pub user_modifiable: bool,
}

impl AttributeType {
    /// User-modifiable, multi-valued, case-ignore attribute.
    #[must_use]
    pub fn new(oid: &str, names: &[&str]) -> Self {
        Self {
            oid: oid.to_string(),
            names: names.iter().map(|n| (*n).to_string()).collect(),
            equality: MatchingRule::CaseIgnore,
            single_valued: false,
            user_modifiable: true,
        }
    }

    /// Sets the equality rule.
    #[must_use]
    pub fn equality(mut self, rule: MatchingRule) -> Self {
        self.equality = rule;
        self
    }

    /// Marks the attribute single-valued.
    #[must_use]
    pub fn single_valued(mut self) -> Self {
        self.single_valued = true;
        self
    }

    /// Marks the attribute operational.
    #[must_use]
    pub fn no_user_modification(mut self) -> Self {
        self.user_modifiable = false;
        self
    }

    /// Canonical name, or the OID for unnamed types.
    #[must_use]
    pub fn name(&self) -> &str {
        self.names.first().map_or(self.oid.as_str(), String::as_str)
    }

    /// Normalizes a value with this type's equality rule.
    ///
    /// # Errors
    ///
    /// See [`MatchingRule::normalize`].
    pub fn normalize(&self, value: &str) -> CoreResult<String> {
        self.equality.normalize(value)
    }
}

/// Object class kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClassKind {
    /// Never instantiated directly.
    Abstract,
    /// Defines what an entry is.
    Structural,
    /// Mixed into structural classes.
    Auxiliary,
}

/// An object class definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectClass {
    /// Numeric OID.
    pub oid: String,
    /// Names, first is canonical.
    pub names: Vec<String>,
    /// Kind.
    pub kind: ObjectClassKind,
    /// Superior class names.
    pub superiors: Vec<String>,
    /// Required attributes.
    pub must: Vec<String>,
    /// Allowed attributes.
    pub may: Vec<String>,
}

impl ObjectClass {
    /// A structural class inheriting from `top`.
    #[must_use]
    pub fn structural(oid: &str, name: &str, must: &[&str], may: &[&str]) -> Self {
        Self {
            oid: oid.to_string(),
            names: vec![name.to_string()],
            kind: ObjectClassKind::Structural,
            superiors: vec!["top".to_string()],
            must: must.iter().map(|m| (*m).to_string()).collect(),
            may: may.iter().map(|m| (*m).to_string()).collect(),
        }
    }

    /// Replaces the superior list.
    #[must_use]
    pub fn superiors(mut self, superiors: &[&str]) -> Self {
        self.superiors = superiors.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Changes the kind.
    #[must_use]
    pub fn kind(mut self, kind: ObjectClassKind) -> Self {
        self.kind = kind;
        self
    }

    /// Canonical name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.names.first().map_or(self.oid.as_str(), String::as_str)
    }
}
