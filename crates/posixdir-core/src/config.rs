//! Configuration model for directory access.
//!
//! A [`Configuration`] describes everything needed to reach the directory and
//! to locate user and group entries inside it: the server pool, bind
//! credentials, the read-only flag, and one [`DirectoryLocation`] per entity
//! category. Values are immutable once resolved; see [`crate::resolve`] for
//! how a configuration is obtained from the supported sources.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Default directory URI when no source provides one.
pub const DEFAULT_URI: &str = "ldap://localhost";

/// Default bind DN.
pub const DEFAULT_BIND_DN: &str = "cn=admin,dc=example,dc=org";

/// Default base DN for user entries.
pub const DEFAULT_USER_BASE_DN: &str = "ou=users,dc=example,dc=org";

/// Default base DN for group entries.
pub const DEFAULT_GROUP_BASE_DN: &str = "ou=groups,dc=example,dc=org";

/// Default primary object class for user entries.
pub const DEFAULT_USER_CLASS: &str = "inetOrgPerson";

/// Default primary object class for group entries.
pub const DEFAULT_GROUP_CLASS: &str = "groupOfNames";

/// A single directory server endpoint.
///
/// Endpoints are tried in configuration order when establishing a connection;
/// the first server that accepts the bind wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    host: String,
    port: u16,
    use_tls: bool,
}

impl ServerEndpoint {
    /// Creates an endpoint from explicit parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
        }
    }

    /// Parses an `ldap://` or `ldaps://` URI into an endpoint.
    ///
    /// The port defaults to 389 for `ldap` and 636 for `ldaps` when the URI
    /// does not carry one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URI is unparsable, uses a scheme other
    /// than `ldap`/`ldaps`, or has no host component.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri.trim())
            .map_err(|err| Error::Config(format!("invalid directory URI `{uri}`: {err}")))?;

        let use_tls = match url.scheme() {
            "ldap" => false,
            "ldaps" => true,
            other => {
                return Err(Error::Config(format!(
                    "unsupported directory URI scheme `{other}` in `{uri}`"
                )))
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("directory URI `{uri}` has no host")))?
            .to_string();
        let port = url.port().unwrap_or(if use_tls { 636 } else { 389 });

        Ok(Self {
            host,
            port,
            use_tls,
        })
    }

    /// Parses a whitespace- or comma-separated list of URIs, in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any URI in the list is invalid, or the
    /// list contains none.
    pub fn from_uri_list(uris: &str) -> Result<Vec<Self>> {
        let endpoints = uris
            .split([' ', ','])
            .filter(|part| !part.trim().is_empty())
            .map(Self::from_uri)
            .collect::<Result<Vec<_>>>()?;

        if endpoints.is_empty() {
            return Err(Error::Config(format!(
                "directory URI list `{uris}` contains no endpoints"
            )));
        }
        Ok(endpoints)
    }

    /// Hostname of the server.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port of the server.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether the endpoint expects TLS.
    #[must_use]
    pub const fn use_tls(&self) -> bool {
        self.use_tls
    }

    /// Renders the endpoint back into URI form.
    #[must_use]
    pub fn uri(&self) -> String {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Schema descriptor for one entity category (users or groups).
///
/// Carries the subtree base DN, the primary object classes that select
/// entries of the category, and any auxiliary classes attached to newly
/// created entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryLocation {
    base_dn: String,
    object_classes: Vec<String>,
    auxiliary_classes: Vec<String>,
}

impl DirectoryLocation {
    /// Creates a location with primary object classes and no auxiliaries.
    #[must_use]
    pub fn new<I, S>(base_dn: impl Into<String>, object_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base_dn: base_dn.into(),
            object_classes: object_classes.into_iter().map(Into::into).collect(),
            auxiliary_classes: Vec::new(),
        }
    }

    /// Replaces the auxiliary object classes.
    #[must_use]
    pub fn with_auxiliary_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auxiliary_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Base distinguished name of the subtree.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Primary object classes.
    #[must_use]
    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    /// Auxiliary object classes.
    #[must_use]
    pub fn auxiliary_classes(&self) -> &[String] {
        &self.auxiliary_classes
    }

    /// Primary followed by auxiliary classes, for populating `objectClass` on
    /// new entries.
    #[must_use]
    pub fn all_classes(&self) -> Vec<String> {
        self.object_classes
            .iter()
            .chain(self.auxiliary_classes.iter())
            .cloned()
            .collect()
    }

    /// Checks the location invariant: a non-empty primary class set and a
    /// non-empty base DN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when either is violated. DN syntax is
    /// checked separately by the directory layer, which owns the DN parser.
    pub fn validate(&self, category: &str) -> Result<()> {
        if self.base_dn.trim().is_empty() {
            return Err(Error::Config(format!("{category} location has no base DN")));
        }
        if self.object_classes.is_empty() {
            return Err(Error::Config(format!(
                "{category} location has no object classes"
            )));
        }
        Ok(())
    }
}

/// Resolved directory configuration.
///
/// Construct directly for embedding scenarios, or through
/// [`crate::resolve::Resolver`] to honor the source precedence rules.
#[derive(Debug, Clone)]
pub struct Configuration {
    servers: Vec<ServerEndpoint>,
    bind_dn: String,
    bind_password: String,
    read_only: bool,
    connection_timeout_secs: u64,
    users: DirectoryLocation,
    groups: DirectoryLocation,
}

impl Configuration {
    /// Creates a configuration from a server pool and bind credentials, with
    /// default entity locations.
    #[must_use]
    pub fn new(
        servers: Vec<ServerEndpoint>,
        bind_dn: impl Into<String>,
        bind_password: impl Into<String>,
    ) -> Self {
        Self {
            servers,
            bind_dn: bind_dn.into(),
            bind_password: bind_password.into(),
            read_only: false,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            users: DirectoryLocation::new(DEFAULT_USER_BASE_DN, [DEFAULT_USER_CLASS]),
            groups: DirectoryLocation::new(DEFAULT_GROUP_BASE_DN, [DEFAULT_GROUP_CLASS]),
        }
    }

    /// Marks the connection read-only; mutations will not be offered.
    #[must_use]
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the users location.
    #[must_use]
    pub fn with_users_location(mut self, location: DirectoryLocation) -> Self {
        self.users = location;
        self
    }

    /// Overrides the groups location.
    #[must_use]
    pub fn with_groups_location(mut self, location: DirectoryLocation) -> Self {
        self.groups = location;
        self
    }

    /// Server pool in trial order.
    #[must_use]
    pub fn servers(&self) -> &[ServerEndpoint] {
        &self.servers
    }

    /// Bind DN used for authentication.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Bind password used for authentication.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        &self.bind_password
    }

    /// Whether the connection is read-only.
    #[must_use]
    pub const fn read_only(&self) -> bool {
        self.read_only
    }

    /// Connection timeout applied when establishing a session.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Location descriptor for user entries.
    #[must_use]
    pub const fn users(&self) -> &DirectoryLocation {
        &self.users
    }

    /// Location descriptor for group entries.
    #[must_use]
    pub const fn groups(&self) -> &DirectoryLocation {
        &self.groups
    }

    /// Validates structural invariants: a non-empty server pool and valid
    /// entity locations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when an invariant is violated.
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Config("server pool is empty".to_string()));
        }
        self.users.validate("users")?;
        self.groups.validate("groups")?;
        Ok(())
    }
}
