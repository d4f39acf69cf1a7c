//! The directory manager: connection lifecycle and the query engine.
//!
//! A [`Directory`] owns the resolved configuration and the single shared
//! session. The session is established lazily, reused while bound, and
//! re-established transparently when the server terminates it mid-search,
//! once per query and never more. All entity operations in the sibling modules
//! run through this type.

use crate::dn::DistinguishedName;
use crate::entry::{Cursor, Entry, FetchedEntry, Modification, WritableEntry};
use crate::filter::Filter;
use crate::session::{LdapClientConnector, LdapConnector, LdapSession, SearchScope};
use crate::Result;
use posixdir_core::config::{Configuration, DirectoryLocation};
use posixdir_core::Error;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Attributes requested for entity lookups: every user attribute plus the
/// modification timestamp, which is operational and must be asked for.
const ENTITY_ATTRIBUTES: &[&str] = &["*", "modifyTimestamp"];

#[derive(Default)]
struct Slot {
    session: Option<Box<dyn LdapSession>>,
    bound: bool,
}

/// Manager for a single shared directory connection.
///
/// Holds the process-wide connection state explicitly instead of in ambient
/// globals; embedders create one `Directory` and pass it around. The session
/// slot is guarded by an async mutex, which serializes connection
/// (re)establishment. Note that the check-then-act id-allocation sequences in
/// the user and group operations still race across concurrent callers; see
/// the crate documentation.
pub struct Directory {
    config: Arc<Configuration>,
    users_base: DistinguishedName,
    groups_base: DistinguishedName,
    connector: Box<dyn LdapConnector>,
    slot: Mutex<Slot>,
}

impl Directory {
    /// Creates a directory manager using the real `ldap3` connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::InvalidDn`] if the configuration
    /// violates its invariants.
    pub fn new(config: Configuration) -> Result<Self> {
        let connector = Box::new(LdapClientConnector::new(config.connection_timeout()));
        Self::with_connector(config, connector)
    }

    /// Creates a directory manager with a custom connector backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::InvalidDn`] if the configuration
    /// violates its invariants.
    pub fn with_connector(
        config: Configuration,
        connector: Box<dyn LdapConnector>,
    ) -> Result<Self> {
        config.validate()?;
        let users_base = DistinguishedName::parse(config.users().base_dn())?;
        let groups_base = DistinguishedName::parse(config.groups().base_dn())?;
        Ok(Self {
            config: Arc::new(config),
            users_base,
            groups_base,
            connector,
            slot: Mutex::new(Slot::default()),
        })
    }

    /// The configuration this directory was built from.
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub(crate) const fn users_base(&self) -> &DistinguishedName {
        &self.users_base
    }

    pub(crate) const fn groups_base(&self) -> &DistinguishedName {
        &self.groups_base
    }

    /// Ensures a bound connection exists, creating one if needed.
    ///
    /// Reuses the cached session while it reports bound. Otherwise each
    /// configured endpoint is tried in order and the first successful
    /// connect-and-bind wins. Returns `false` when every server refused;
    /// that is a recoverable condition, reported as status rather than an
    /// error.
    pub async fn ensure_connection(&self) -> bool {
        let mut slot = self.slot.lock().await;
        self.ensure_locked(&mut slot).await
    }

    /// Whether a bound connection is currently cached.
    pub async fn is_bound(&self) -> bool {
        self.slot.lock().await.bound
    }

    /// Tears the connection down: unbind (best effort) and drop.
    ///
    /// The next operation will establish a fresh session. Intended for
    /// embedders shutting down and for tests resetting state.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(mut session) = slot.session.take() {
            if let Err(err) = session.unbind().await {
                debug!("unbind on close failed: {err}");
            }
        }
        slot.bound = false;
    }

    async fn ensure_locked(&self, slot: &mut Slot) -> bool {
        if slot.bound && slot.session.is_some() {
            return true;
        }
        slot.session = None;
        slot.bound = false;

        for endpoint in self.config.servers() {
            let mut session = match self.connector.connect(endpoint).await {
                Ok(session) => session,
                Err(err) => {
                    warn!("connect to {} failed: {err}", endpoint.uri());
                    continue;
                }
            };
            match session
                .simple_bind(self.config.bind_dn(), self.config.bind_password())
                .await
            {
                Ok(()) => {
                    debug!("bound to {} as {}", endpoint.uri(), self.config.bind_dn());
                    slot.session = Some(session);
                    slot.bound = true;
                    return true;
                }
                Err(err) => warn!("bind to {} failed: {err}", endpoint.uri()),
            }
        }
        false
    }

    /// Runs a search with the retry protocol, returning raw entries.
    ///
    /// The one failure class that is retried is a server-terminated session:
    /// the slot is invalidated, the connection re-established, and the
    /// identical search re-issued exactly once. A second termination, and
    /// every other error, propagates unmodified.
    pub(crate) async fn execute_search(
        &self,
        base_dn: &str,
        filter: &str,
        attributes: &'static [&'static str],
    ) -> Result<Vec<Entry>> {
        let mut slot = self.slot.lock().await;
        let mut retried = false;
        loop {
            if !self.ensure_locked(&mut slot).await {
                return Err(Error::Unavailable(
                    "no directory server accepted the bind".to_string(),
                ));
            }
            let Some(session) = slot.session.as_mut() else {
                return Err(Error::Unavailable("no session".to_string()));
            };
            match session
                .search(base_dn, SearchScope::Subtree, filter, attributes)
                .await
            {
                Ok(entries) => return Ok(entries),
                Err(err) if err.is_session_terminated() && !retried => {
                    debug!("session terminated during search, reconnecting once");
                    slot.session = None;
                    slot.bound = false;
                    retried = true;
                }
                Err(err) => {
                    if err.is_session_terminated() {
                        slot.session = None;
                        slot.bound = false;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Queries a location and returns a capability-tagged cursor.
    ///
    /// The location's primary object classes are always part of the filter;
    /// `filter` narrows further. Over a read-write connection the result set
    /// converts one-to-one into writable entries; over a read-only connection
    /// plain entries come back. Zero matches yield an empty cursor, not an
    /// error.
    ///
    /// # Errors
    ///
    /// [`Error::Unavailable`] when no server accepts the bind; directory
    /// errors from the server otherwise.
    pub async fn search(
        &self,
        location: &DirectoryLocation,
        filter: Option<Filter>,
    ) -> Result<Cursor> {
        let filter_string = compose_filter(location, filter);
        let entries = self
            .execute_search(location.base_dn(), &filter_string, ENTITY_ATTRIBUTES)
            .await?;

        if self.config.read_only() {
            Ok(Cursor::ReadOnly(entries))
        } else {
            Ok(Cursor::ReadWrite(
                entries.into_iter().map(WritableEntry::from_entry).collect(),
            ))
        }
    }

    /// Fetches the single entry where `attribute` equals `value`.
    ///
    /// # Errors
    ///
    /// [`Error::TooManyResults`] when more than one entry matches: an
    /// ambiguous mapping is a caller or data error, never silently resolved.
    /// Zero matches (and an unavailable directory) return `Ok(None)`.
    pub async fn get_single_object(
        &self,
        location: &DirectoryLocation,
        attribute: &str,
        value: &str,
    ) -> Result<Option<FetchedEntry>> {
        let cursor = match self.search(location, Some(Filter::eq(attribute, value))).await {
            Ok(cursor) => cursor,
            Err(Error::Unavailable(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        match cursor.len() {
            0 => Ok(None),
            1 => Ok(cursor.into_single()),
            count => Err(Error::TooManyResults {
                attribute: attribute.to_string(),
                value: value.to_string(),
                count,
            }),
        }
    }

    /// Constructs an uncommitted entry at `dn` carrying the location's
    /// primary and auxiliary object classes.
    ///
    /// Nothing is written until the caller commits. When no bound connection
    /// is available (or the connection is read-only) the entry comes back
    /// detached; check [`WritableEntry::is_attached`] before populating it.
    pub async fn new_entity(
        &self,
        location: &DirectoryLocation,
        dn: impl Into<String>,
    ) -> WritableEntry {
        let attached = self.ensure_connection().await && !self.config.read_only();
        WritableEntry::create(dn.into(), location.all_classes(), attached)
    }

    pub(crate) async fn apply_modify(&self, dn: &str, modifications: &[Modification]) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if !self.ensure_locked(&mut slot).await {
            return Err(Error::Unavailable(
                "no directory server accepted the bind".to_string(),
            ));
        }
        let Some(session) = slot.session.as_mut() else {
            return Err(Error::Unavailable("no session".to_string()));
        };
        let result = session.modify(dn, modifications).await;
        if let Err(err) = &result {
            if err.is_session_terminated() {
                slot.session = None;
                slot.bound = false;
            }
        }
        result
    }

    pub(crate) async fn apply_add(
        &self,
        dn: &str,
        attributes: Vec<(String, Vec<String>)>,
    ) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if !self.ensure_locked(&mut slot).await {
            return Err(Error::Unavailable(
                "no directory server accepted the bind".to_string(),
            ));
        }
        let Some(session) = slot.session.as_mut() else {
            return Err(Error::Unavailable("no session".to_string()));
        };
        let result = session.add(dn, attributes).await;
        if let Err(err) = &result {
            if err.is_session_terminated() {
                slot.session = None;
                slot.bound = false;
            }
        }
        result
    }
}

fn compose_filter(location: &DirectoryLocation, filter: Option<Filter>) -> String {
    let mut clauses: Vec<Filter> = location
        .object_classes()
        .iter()
        .map(|class| Filter::eq("objectClass", class.clone()))
        .collect();
    clauses.extend(filter);
    Filter::and(clauses).render()
}
