//! Distinguished name parsing and composition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use posixdir_core::Error as CoreError;

/// Errors that can occur when parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component lacked the `attribute=value` shape.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component had no attribute name before the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component had no value after the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended inside an escape sequence.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DnError> for CoreError {
    fn from(err: DnError) -> Self {
        CoreError::InvalidDn(err.to_string())
    }
}

/// A single `attribute=value` component of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rdn {
    attribute: String,
    value: String,
}

impl Rdn {
    /// Creates a component from an attribute and an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute name (e.g. `uid`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Strongly-typed distinguished name.
///
/// Keeps a canonical string form alongside the parsed components. Parsing is
/// strict so malformed DNs surface early, at configuration time rather than
/// in the middle of a directory operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    raw: String,
    components: Vec<Rdn>,
}

impl DistinguishedName {
    /// Parses a distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`DnError`] if the input is empty or any component is not an
    /// `attribute=value` pair.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DnError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DnError::Empty);
        }

        let mut components = Vec::new();
        for part in split_unescaped(raw)? {
            components.push(parse_component(&part)?);
        }

        Ok(Self {
            raw: render(&components),
            components,
        })
    }

    /// Borrows the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Components in order, most specific first.
    #[must_use]
    pub fn components(&self) -> &[Rdn] {
        &self.components
    }

    /// Value of the first component matching `attribute` (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(Rdn::value)
    }

    /// Creates the DN of an entry directly below this one.
    ///
    /// The value is escaped on rendering, so callers can pass raw attribute
    /// values.
    #[must_use]
    pub fn child(&self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.push(Rdn::new(attribute, value));
        components.extend(self.components.iter().cloned());
        Self {
            raw: render(&components),
            components,
        }
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DnError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(dn: DistinguishedName) -> Self {
        dn.raw
    }
}

fn split_unescaped(input: &str) -> Result<Vec<String>, DnError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push('\\');
            current.push(ch);
            escape = false;
            continue;
        }
        match ch {
            '\\' => escape = true,
            ',' => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if escape {
        return Err(DnError::UnterminatedEscape);
    }
    parts.push(current.trim().to_string());

    if parts.iter().any(String::is_empty) {
        return Err(DnError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn parse_component(component: &str) -> Result<Rdn, DnError> {
    let mut escape = false;
    let mut separator = None;
    for (index, ch) in component.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' => escape = true,
            '=' => {
                separator = Some(index);
                break;
            }
            _ => {}
        }
    }

    let index =
        separator.ok_or_else(|| DnError::InvalidComponent(component.to_string()))?;
    let attribute = component[..index].trim();
    let value = component[index + 1..].trim_start();

    if attribute.is_empty() {
        return Err(DnError::MissingAttribute(component.to_string()));
    }
    if value.is_empty() {
        return Err(DnError::MissingValue(attribute.to_string()));
    }

    Ok(Rdn::new(attribute, unescape(value)?))
}

fn unescape(value: &str) -> Result<String, DnError> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            result.push(chars.next().ok_or(DnError::UnterminatedEscape)?);
        } else {
            result.push(ch);
        }
    }
    Ok(result)
}

fn escape(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut escaped = String::with_capacity(value.len());

    for (index, ch) in chars.iter().enumerate() {
        let first = index == 0;
        let last = index == chars.len() - 1;
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (first && (*ch == ' ' || *ch == '#'))
            || (last && *ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(*ch);
    }

    escaped
}

fn render(components: &[Rdn]) -> String {
    components
        .iter()
        .map(|rdn| format!("{}={}", rdn.attribute(), escape(rdn.value())))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_dn() {
        let dn = DistinguishedName::parse("uid=jdoe,ou=people,dc=example,dc=org").unwrap();
        assert_eq!(dn.get("uid"), Some("jdoe"));
        assert_eq!(dn.get("OU"), Some("people"));
        assert_eq!(dn.as_str(), "uid=jdoe,ou=people,dc=example,dc=org");
        assert_eq!(dn.components().len(), 4);
    }

    #[test]
    fn parse_dn_with_escaped_comma() {
        let dn = DistinguishedName::parse("cn=Smith\\, John,ou=people,dc=example,dc=org").unwrap();
        assert_eq!(dn.get("cn"), Some("Smith, John"));
        assert!(dn.to_string().starts_with("cn=Smith\\, John,"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            DistinguishedName::parse(""),
            Err(DnError::Empty)
        ));
        assert!(matches!(
            DistinguishedName::parse("uid=jdoe,"),
            Err(DnError::InvalidComponent(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("nosigil"),
            Err(DnError::InvalidComponent(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("=value"),
            Err(DnError::MissingAttribute(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("uid="),
            Err(DnError::MissingValue(_))
        ));
    }

    #[test]
    fn child_composes_and_escapes() {
        let base = DistinguishedName::parse("ou=groups,dc=example,dc=org").unwrap();
        let dn = base.child("cn", "dev,ops");
        assert_eq!(dn.as_str(), "cn=dev\\,ops,ou=groups,dc=example,dc=org");
        assert_eq!(dn.get("cn"), Some("dev,ops"));

        // Round-trips through the parser.
        let reparsed = DistinguishedName::parse(dn.as_str()).unwrap();
        assert_eq!(reparsed, dn);
    }

    #[test]
    fn error_converts_to_core() {
        let err: CoreError = DnError::Empty.into();
        assert!(matches!(err, CoreError::InvalidDn(_)));
    }
}
