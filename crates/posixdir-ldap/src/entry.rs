//! Directory entries and result cursors.
//!
//! Search results come back as either plain [`Entry`] values or
//! [`WritableEntry`] values depending on the connection mode; the commit
//! capability only exists on the writable type. Pending changes on a
//! writable entry are purely local until [`WritableEntry::commit`] runs, so
//! dropping an uncommitted entry never touches the server.

use crate::directory::Directory;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use tracing::warn;

/// A directory entry: a distinguished name plus its attribute map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: String,
    attributes: HashMap<String, Vec<String>>,
}

impl Entry {
    /// Creates an entry from raw parts.
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: HashMap<String, Vec<String>>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Distinguished name of the entry.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Full attribute map.
    #[must_use]
    pub const fn attributes(&self) -> &HashMap<String, Vec<String>> {
        &self.attributes
    }

    /// First value of the attribute, if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// All values of the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }

    /// First value parsed as an unsigned integer (uidNumber, gidNumber).
    #[must_use]
    pub fn first_u32(&self, attribute: &str) -> Option<u32> {
        self.first(attribute).and_then(|value| value.parse().ok())
    }

    /// First value parsed as a boolean (`true` / `1`).
    #[must_use]
    pub fn bool_value(&self, attribute: &str) -> bool {
        self.first(attribute)
            .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
            .unwrap_or(false)
    }

    /// Whether the attribute carries the given value.
    #[must_use]
    pub fn has_value(&self, attribute: &str, value: &str) -> bool {
        self.values(attribute)
            .map(|values| values.iter().any(|existing| existing == value))
            .unwrap_or(false)
    }

    /// Last modification time, parsed from the `modifyTimestamp` operational
    /// attribute (LDAP generalized time, e.g. `20240131120000Z`).
    #[must_use]
    pub fn modify_timestamp(&self) -> Option<DateTime<Utc>> {
        self.first("modifyTimestamp")
            .and_then(|value| NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%SZ").ok())
            .map(|naive| naive.and_utc())
    }
}

/// An attribute change queued on a writable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Add values to an attribute.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete values from an attribute (empty values removes the attribute).
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete.
        values: Vec<String>,
    },
    /// Replace all values of an attribute.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

/// A write-capable entry.
///
/// Obtained from a search over a read-write connection, or freshly
/// constructed by the entity-creation operations. Attribute edits apply to
/// the local map immediately and are queued for the server; [`Self::commit`]
/// sends them. An entry created while no bound connection was available is
/// *detached*: edits still work locally but commit always reports `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritableEntry {
    entry: Entry,
    pending: Vec<Modification>,
    exists: bool,
    attached: bool,
}

impl WritableEntry {
    /// Wraps a fetched entry, preserving its identity and attributes.
    pub(crate) fn from_entry(entry: Entry) -> Self {
        Self {
            entry,
            pending: Vec::new(),
            exists: true,
            attached: true,
        }
    }

    /// Builds a new, uncommitted entry carrying the given object classes.
    pub(crate) fn create(dn: String, object_classes: Vec<String>, attached: bool) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("objectClass".to_string(), object_classes);
        Self {
            entry: Entry::new(dn, attributes),
            pending: Vec::new(),
            exists: false,
            attached,
        }
    }

    /// Read view of the entry, reflecting local edits.
    #[must_use]
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Distinguished name of the entry.
    #[must_use]
    pub fn dn(&self) -> &str {
        self.entry.dn()
    }

    /// First value of the attribute, if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.entry.first(attribute)
    }

    /// All values of the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.entry.values(attribute)
    }

    /// First value parsed as an unsigned integer.
    #[must_use]
    pub fn first_u32(&self, attribute: &str) -> Option<u32> {
        self.entry.first_u32(attribute)
    }

    /// False when the entry was created without a bound connection; such an
    /// entry can be edited locally but never committed.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// True until the entry has been successfully committed at least once.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        !self.exists
    }

    /// Whether local edits are waiting to be sent.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        if self.exists {
            !self.pending.is_empty()
        } else {
            true
        }
    }

    /// Replaces all values of an attribute.
    pub fn replace(&mut self, attribute: impl Into<String>, values: Vec<String>) {
        let attribute = attribute.into();
        self.entry
            .attributes
            .insert(attribute.clone(), values.clone());
        if self.exists {
            self.pending.push(Modification::Replace { attribute, values });
        }
    }

    /// Sets an attribute to a single value.
    pub fn set(&mut self, attribute: impl Into<String>, value: impl ToString) {
        self.replace(attribute, vec![value.to_string()]);
    }

    /// Adds values to a multi-valued attribute.
    pub fn add_values(&mut self, attribute: impl Into<String>, values: Vec<String>) {
        let attribute = attribute.into();
        self.entry
            .attributes
            .entry(attribute.clone())
            .or_default()
            .extend(values.clone());
        if self.exists {
            self.pending.push(Modification::Add { attribute, values });
        }
    }

    /// Removes values from a multi-valued attribute.
    pub fn remove_values(&mut self, attribute: impl Into<String>, values: Vec<String>) {
        let attribute = attribute.into();
        if let Some(existing) = self.entry.attributes.get_mut(&attribute) {
            existing.retain(|value| !values.contains(value));
            if existing.is_empty() {
                self.entry.attributes.remove(&attribute);
            }
        }
        if self.exists {
            self.pending.push(Modification::Delete { attribute, values });
        }
    }

    /// Commits pending changes to the server.
    ///
    /// New entries are added with their full attribute set; existing entries
    /// receive the queued modifications. Returns `true` on success. A server
    /// rejection or a detached entry yields `false`; the local edits remain
    /// in place, uncommitted.
    pub async fn commit(&mut self, directory: &Directory) -> bool {
        if !self.attached {
            warn!("commit of {} skipped: entry is not attached", self.dn());
            return false;
        }
        if !self.has_pending_changes() {
            return true;
        }

        let result = if self.exists {
            directory.apply_modify(self.entry.dn(), &self.pending).await
        } else {
            let attributes: Vec<(String, Vec<String>)> = self
                .entry
                .attributes
                .iter()
                .map(|(attribute, values)| (attribute.clone(), values.clone()))
                .collect();
            directory.apply_add(self.entry.dn(), attributes).await
        };

        match result {
            Ok(()) => {
                self.pending.clear();
                self.exists = true;
                true
            }
            Err(err) => {
                warn!("commit of {} rejected: {err}", self.dn());
                false
            }
        }
    }
}

/// A single fetched entry, write-capable when the connection allows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedEntry {
    /// Entry from a read-only connection.
    ReadOnly(Entry),
    /// Entry from a read-write connection.
    Writable(WritableEntry),
}

impl FetchedEntry {
    /// Read view of the entry, whichever variant it is.
    #[must_use]
    pub const fn entry(&self) -> &Entry {
        match self {
            Self::ReadOnly(entry) => entry,
            Self::Writable(writable) => writable.entry(),
        }
    }

    /// Distinguished name of the entry.
    #[must_use]
    pub fn dn(&self) -> &str {
        self.entry().dn()
    }

    /// First value of the attribute, if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.entry().first(attribute)
    }

    /// First value parsed as an unsigned integer.
    #[must_use]
    pub fn first_u32(&self, attribute: &str) -> Option<u32> {
        self.entry().first_u32(attribute)
    }

    /// Whether the entry can be mutated and committed.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        matches!(self, Self::Writable(_))
    }

    /// Extracts the writable entry, if the connection allowed writes.
    #[must_use]
    pub fn into_writable(self) -> Option<WritableEntry> {
        match self {
            Self::ReadOnly(_) => None,
            Self::Writable(writable) => Some(writable),
        }
    }

    /// Discards the write capability and keeps the plain entry.
    #[must_use]
    pub fn into_entry(self) -> Entry {
        match self {
            Self::ReadOnly(entry) => entry,
            Self::Writable(writable) => writable.entry,
        }
    }
}

/// Result set of a search, tagged by capability.
///
/// The read-write variant is only produced over a read-write connection; the
/// commit operation does not exist on the read-only variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Enumerable, attributes readable.
    ReadOnly(Vec<Entry>),
    /// Enumerable, attributes readable and settable, entries committable.
    ReadWrite(Vec<WritableEntry>),
}

impl Cursor {
    /// Number of entries in the result set.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::ReadOnly(entries) => entries.len(),
            Self::ReadWrite(entries) => entries.len(),
        }
    }

    /// Whether the search matched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strips write capability and returns plain entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            Self::ReadOnly(entries) => entries,
            Self::ReadWrite(entries) => entries
                .into_iter()
                .map(|writable| writable.entry)
                .collect(),
        }
    }

    pub(crate) fn into_single(self) -> Option<FetchedEntry> {
        match self {
            Self::ReadOnly(mut entries) => {
                (entries.len() == 1).then(|| FetchedEntry::ReadOnly(entries.remove(0)))
            }
            Self::ReadWrite(mut entries) => {
                (entries.len() == 1).then(|| FetchedEntry::Writable(entries.remove(0)))
            }
        }
    }
}
