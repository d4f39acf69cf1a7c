//! Directory session capability traits and the ldap3-backed implementation.
//!
//! The [`LdapConnector`] / [`LdapSession`] pair is the seam between this
//! crate and the wire protocol: everything above it works against the traits,
//! so tests (and embedders with unusual transports) can supply their own
//! backends.

use crate::entry::{Entry, Modification};
use crate::Result;
use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use posixdir_core::config::ServerEndpoint;
use posixdir_core::Error;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Search scope for directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// A bound (or bindable) session with one directory server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Authenticates the session.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Runs a search and returns the matching entries.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<Entry>>;

    /// Applies attribute modifications to an existing entry.
    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<()>;

    /// Adds a new entry with the given attributes.
    async fn add(&mut self, dn: &str, attributes: Vec<(String, Vec<String>)>) -> Result<()>;

    /// Closes the session.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens sessions against individual server endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Connects to one endpoint and returns an unauthenticated session.
    async fn connect(&self, endpoint: &ServerEndpoint) -> Result<Box<dyn LdapSession>>;
}

/// Connector backed by the `ldap3` client.
pub struct LdapClientConnector {
    connection_timeout: Duration,
}

impl LdapClientConnector {
    /// Creates a connector applying the given connection timeout.
    #[must_use]
    pub const fn new(connection_timeout: Duration) -> Self {
        Self { connection_timeout }
    }
}

#[async_trait]
impl LdapConnector for LdapClientConnector {
    async fn connect(&self, endpoint: &ServerEndpoint) -> Result<Box<dyn LdapSession>> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.connection_timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &endpoint.uri())
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        debug!("connected to {}", endpoint.uri());
        Ok(Box::new(LdapClientSession { inner: ldap }))
    }
}

struct LdapClientSession {
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for LdapClientSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self
            .inner
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?;
        ensure_success(&result)
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<Entry>> {
        let result = self
            .inner
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .await
            .map_err(map_ldap_error)?;
        let (entries, _) = result.success().map_err(map_ldap_error)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| Entry::new(entry.dn, entry.attrs))
            .collect())
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<()> {
        let mods: Vec<Mod<String>> = modifications
            .iter()
            .map(|modification| match modification {
                Modification::Add { attribute, values } => Mod::Add(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                Modification::Delete { attribute, values } => Mod::Delete(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                Modification::Replace { attribute, values } => Mod::Replace(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
            })
            .collect();

        let result = self
            .inner
            .modify(dn, mods)
            .await
            .map_err(map_ldap_error)?;
        ensure_success(&result)
    }

    async fn add(&mut self, dn: &str, attributes: Vec<(String, Vec<String>)>) -> Result<()> {
        let attrs: Vec<(String, HashSet<String>)> = attributes
            .into_iter()
            .map(|(attribute, values)| (attribute, values.into_iter().collect()))
            .collect();

        let result = self.inner.add(dn, attrs).await.map_err(map_ldap_error)?;
        ensure_success(&result)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

fn ensure_success(result: &ldap3::LdapResult) -> Result<()> {
    if result.rc == 0 {
        Ok(())
    } else {
        Err(Error::Directory {
            code: result.rc,
            message: result.text.clone(),
        })
    }
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    match err {
        // The server dropped the session underneath us; the query engine
        // recovers from this class with a single reconnect.
        ldap3::LdapError::EndOfStream
        | ldap3::LdapError::OpSend { .. }
        | ldap3::LdapError::ResultRecv { .. } => Error::SessionTerminated(err.to_string()),
        ldap3::LdapError::Timeout { .. } => Error::Timeout(err.to_string()),
        ldap3::LdapError::LdapResult { result } => Error::Directory {
            code: result.rc,
            message: result.text,
        },
        other => Error::Transport(other.to_string()),
    }
}
