use super::{escape, normalize_value, split_unescaped, unescape};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One `attribute=value` assertion.
#[derive(Debug, Clone)]
pub struct Ava {
    attribute: String,
    value: String,
    norm_attribute: String,
    norm_value: String,
}

impl Ava {
    /// Builds an assertion from an unescaped attribute name and value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        let attribute = attribute.into();
        let value = value.into();
        Self {
            norm_attribute: attribute.trim().to_ascii_lowercase(),
            norm_value: normalize_value(&value),
            attribute,
            value,
        }
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let parts = split_unescaped(raw, '=');
        if parts.len() < 2 {
            return Err(format!("missing '=' in {raw:?}"));
        }
        let attribute = parts[0].trim();
        if !is_attribute_descr(attribute) {
            return Err(format!("bad attribute type {attribute:?}"));
        }
        // Only the first '=' separates; the rest belongs to the value.
        let value_raw = &raw[parts[0].len() + 1..];
        let value = unescape(trim_unescaped(value_raw))?;
        Ok(Self::new(attribute, value))
    }

    /// Attribute name as supplied.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Value as supplied.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Lowercased attribute name.
    #[must_use]
    pub fn normalized_attribute(&self) -> &str {
        &self.norm_attribute
    }

    /// Normalized value.
    #[must_use]
    pub fn normalized_value(&self) -> &str {
        &self.norm_value
    }

    fn write_normalized(&self, out: &mut String) {
        out.push_str(&self.norm_attribute);
        out.push('=');
        out.push_str(&escape(&self.norm_value));
    }
}

impl PartialEq for Ava {
    fn eq(&self, other: &Self) -> bool {
        self.norm_attribute == other.norm_attribute && self.norm_value == other.norm_value
    }
}

impl Eq for Ava {}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape(&self.value))
    }
}

/// Relative distinguished name: one or more assertions joined with `+`.
///
/// Assertions are kept sorted by normalized attribute, so the order the
/// caller wrote them in does not affect equality.
#[derive(Debug, Clone)]
pub struct Rdn {
    avas: Vec<Ava>,
    norm: String,
}

impl Rdn {
    /// Single-valued Rdn.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::from_avas(vec![Ava::new(attribute, value)])
    }

    pub(crate) fn from_avas(mut avas: Vec<Ava>) -> Self {
        avas.sort_by(|a, b| {
            a.norm_attribute
                .cmp(&b.norm_attribute)
                .then_with(|| a.norm_value.cmp(&b.norm_value))
        });
        avas.dedup();
        let mut norm = String::new();
        for (i, ava) in avas.iter().enumerate() {
            if i > 0 {
                norm.push('+');
            }
            ava.write_normalized(&mut norm);
        }
        Self { avas, norm }
    }

    /// Parses `cn=a` or `cn=a+sn=b`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDn`](crate::CoreError::InvalidDn) on a
    /// syntax error.
    pub fn parse(raw: &str) -> crate::CoreResult<Self> {
        Self::parse_inner(raw).map_err(|reason| crate::CoreError::InvalidDn {
            dn: raw.to_string(),
            reason,
        })
    }

    pub(crate) fn parse_inner(raw: &str) -> Result<Self, String> {
        if raw.trim().is_empty() {
            return Err("empty rdn".into());
        }
        let avas = split_unescaped(raw, '+')
            .into_iter()
            .map(Ava::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_avas(avas))
    }

    /// Assertions in normalized order.
    #[must_use]
    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    /// First assertion's attribute name as supplied.
    #[must_use]
    pub fn attribute(&self) -> &str {
        self.avas.first().map_or("", Ava::attribute)
    }

    /// First assertion's value as supplied.
    #[must_use]
    pub fn value(&self) -> &str {
        self.avas.first().map_or("", Ava::value)
    }

    /// Normalized text, e.g. `cn=john smith`.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.norm
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm.hash(state);
    }
}

impl PartialOrd for Rdn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rdn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.norm.cmp(&other.norm)
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{ava}")?;
        }
        Ok(())
    }
}

fn is_attribute_descr(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric() || c == '-'),
        Some(c) if c.is_ascii_digit() => s.chars().all(|c| c.is_ascii_digit() || c == '.'),
        _ => false,
    }
}

/// Trims surrounding spaces, keeping a trailing space that was escaped.
fn trim_unescaped(raw: &str) -> &str {
    let start = raw.len() - raw.trim_start().len();
    let mut end = raw.trim_end().len();
    if end < raw.len() && raw[..end].ends_with('\\') && !raw[..end].ends_with("\\\\") {
        end += 1;
    }
    &raw[start..end.max(start)]
}
