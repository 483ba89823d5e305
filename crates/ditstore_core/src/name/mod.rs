//! Distinguished names.
//!
//! A [`Dn`] is a sequence of [`Rdn`]s stored leaf first, so
//! `cn=x,ou=people,dc=test` has `cn=x` at index 0. Every component keeps the
//! text the caller supplied (used for display) and a normalized form (used
//! for equality, ordering, hashing and index keys).
//!
//! Normalization is schema independent: attribute names are lowercased and
//! values are trimmed, whitespace-collapsed and lowercased. That matches the
//! case-ignore rules of every naming attribute in the core schema.

mod dn;
mod rdn;

pub use dn::Dn;
pub use rdn::{Ava, Rdn};

/// Case-ignore normalization of one attribute value.
#[must_use]
pub fn normalize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for word in value.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Splits `input` on `sep` wherever it is not preceded by a backslash.
pub(crate) fn split_unescaped(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&input[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Resolves backslash escapes, both `\c` and the two-digit hex form `\2C`.
pub(crate) fn unescape(raw: &str) -> Result<String, String> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(next) = chars.next() else {
            return Err("dangling escape at end of value".into());
        };
        if next.is_ascii_hexdigit() {
            let low = chars
                .next()
                .filter(char::is_ascii_hexdigit)
                .ok_or_else(|| format!("incomplete hex escape \\{next}"))?;
            let pair: String = [next, low].iter().collect();
            let byte = u8::from_str_radix(&pair, 16).map_err(|e| e.to_string())?;
            bytes.push(byte);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8(bytes).map_err(|_| "escaped bytes are not valid UTF-8".to_string())
}

/// Escapes a value for display inside a Dn string.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let special = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if special {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_and_lowercases() {
        assert_eq!(normalize_value("  John   SMITH "), "john smith");
        assert_eq!(normalize_value(""), "");
    }

    #[test]
    fn split_respects_escapes() {
        assert_eq!(split_unescaped(r"cn=a\,b,dc=x", ','), vec![r"cn=a\,b", "dc=x"]);
        assert_eq!(split_unescaped("a+b", '+'), vec!["a", "b"]);
    }

    #[test]
    fn unescape_handles_both_forms() {
        assert_eq!(unescape(r"a\,b").unwrap(), "a,b");
        assert_eq!(unescape(r"a\2Cb").unwrap(), "a,b");
        assert!(unescape("a\\").is_err());
        assert!(unescape(r"a\2").is_err());
    }

    #[test]
    fn escape_round_trips_through_unescape() {
        for raw in ["a,b", " lead", "trail ", "#hash", "x=y+z"] {
            assert_eq!(unescape(&escape(raw)).unwrap(), raw);
        }
    }
}
