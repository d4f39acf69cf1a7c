//! Directory search filters.
//!
//! A small composition language over attribute equality and presence,
//! rendered into standard filter syntax. Attribute values are escaped at
//! render time, so user-supplied input can never alter the filter structure.
//! The `attr: value` shorthand accepted by [`Filter::simple`] mirrors the
//! simplified query form many directory tools use.

/// A directory search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Attribute equality against a literal value.
    Eq(String, String),
    /// Attribute presence (`attr=*`).
    Present(String),
    /// Conjunction of sub-filters.
    And(Vec<Filter>),
    /// Disjunction of sub-filters.
    Or(Vec<Filter>),
}

impl Filter {
    /// Equality filter on a literal value.
    #[must_use]
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq(attribute.into(), value.into())
    }

    /// Presence filter.
    #[must_use]
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::Present(attribute.into())
    }

    /// Conjunction. A single-element conjunction collapses to that element.
    #[must_use]
    pub fn and(filters: impl IntoIterator<Item = Self>) -> Self {
        collapse(filters.into_iter().collect(), true)
    }

    /// Disjunction. A single-element disjunction collapses to that element.
    #[must_use]
    pub fn or(filters: impl IntoIterator<Item = Self>) -> Self {
        collapse(filters.into_iter().collect(), false)
    }

    /// Parses the `attr: value` shorthand.
    ///
    /// A value of `*` becomes a presence filter. Returns `None` when the
    /// input does not contain a `:` separator or either side is empty.
    #[must_use]
    pub fn simple(input: &str) -> Option<Self> {
        let (attribute, value) = input.split_once(':')?;
        let attribute = attribute.trim();
        let value = value.trim();
        if attribute.is_empty() || value.is_empty() {
            return None;
        }
        if value == "*" {
            return Some(Self::present(attribute));
        }
        Some(Self::eq(attribute, value))
    }

    /// Renders into standard filter syntax, escaping literal values.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Eq(attribute, value) => {
                format!("({attribute}={})", escape_filter_value(value))
            }
            Self::Present(attribute) => format!("({attribute}=*)"),
            Self::And(filters) => render_set('&', filters),
            Self::Or(filters) => render_set('|', filters),
        }
    }
}

fn collapse(mut filters: Vec<Filter>, conjunction: bool) -> Filter {
    match filters.len() {
        // An empty set matches everything; objectClass is present on every entry.
        0 => Filter::present("objectClass"),
        1 => filters.remove(0),
        _ => {
            if conjunction {
                Filter::And(filters)
            } else {
                Filter::Or(filters)
            }
        }
    }
}

fn render_set(operator: char, filters: &[Filter]) -> String {
    let inner: String = filters.iter().map(Filter::render).collect();
    format!("({operator}{inner})")
}

/// Escapes filter metacharacters in a literal value (RFC 4515 hex form).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
