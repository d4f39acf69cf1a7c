//! Group entity operations.

use crate::directory::Directory;
use crate::entry::{Entry, FetchedEntry, WritableEntry};
use crate::filter::Filter;
use crate::Result;
use posixdir_core::Error;
use tracing::{debug, warn};

/// Attributes fetched by the gid-allocation scan.
const GID_SCAN_ATTRIBUTES: &[&str] = &["gidNumber"];

// gidNumber comes from the posixGroup schema, mirroring the uid scan.
const POSIX_GROUP_FILTER: &str = "(objectClass=posixGroup)";

/// Request for creating a group.
///
/// A `gid_number` of zero (the default) allocates the next free gid at
/// creation time. Groups must be created with at least one member.
#[derive(Debug, Clone)]
pub struct NewGroup {
    cn: String,
    gid_number: u32,
    members: Vec<String>,
    description: Option<String>,
}

impl NewGroup {
    /// Starts a request for a group with the given common name.
    #[must_use]
    pub fn new(cn: impl Into<String>) -> Self {
        Self {
            cn: cn.into(),
            gid_number: 0,
            members: Vec::new(),
            description: None,
        }
    }

    /// Uses a fixed gid instead of allocating one.
    #[must_use]
    pub const fn gid_number(mut self, gid_number: u32) -> Self {
        self.gid_number = gid_number;
        self
    }

    /// Adds an initial member DN.
    #[must_use]
    pub fn member(mut self, dn: impl Into<String>) -> Self {
        self.members.push(dn.into());
        self
    }

    /// Replaces the initial member list.
    #[must_use]
    pub fn members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = members.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the group description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Directory {
    /// Fetches a single group by common name.
    ///
    /// # Errors
    ///
    /// [`Error::TooManyResults`] when the name is ambiguous. An unavailable
    /// directory returns `Ok(None)`.
    pub async fn get_group(&self, cn: &str) -> Result<Option<FetchedEntry>> {
        self.get_single_object(self.config().groups(), "cn", cn)
            .await
    }

    /// Lists group entries, optionally narrowed by a filter.
    ///
    /// The configured group object classes always apply; `filter` restricts
    /// further. An unavailable directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Directory errors other than unavailability propagate.
    pub async fn list_groups(&self, filter: Option<Filter>) -> Result<Vec<Entry>> {
        match self.search(self.config().groups(), filter).await {
            Ok(cursor) => Ok(cursor.into_entries()),
            Err(Error::Unavailable(message)) => {
                debug!("listing groups without a bound connection: {message}");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the groups whose `member` attribute contains `dn`.
    ///
    /// A reverse-membership query: nested groups are not expanded.
    ///
    /// # Errors
    ///
    /// Directory errors other than unavailability propagate.
    pub async fn member_of(&self, dn: &str) -> Result<Vec<Entry>> {
        self.list_groups(Some(Filter::eq("member", dn))).await
    }

    /// Finds the next unused POSIX group id.
    ///
    /// Scans every `posixGroup` entry under the groups location and returns
    /// the highest `gidNumber` plus one, or `0` when none exist (including
    /// when no connection is available). Like the uid scan, this is a full
    /// pass with no allocation guard across concurrent callers.
    ///
    /// # Errors
    ///
    /// Directory errors other than unavailability propagate.
    pub async fn next_gid_number(&self) -> Result<u32> {
        let entries = match self
            .execute_search(
                self.config().groups().base_dn(),
                POSIX_GROUP_FILTER,
                GID_SCAN_ATTRIBUTES,
            )
            .await
        {
            Ok(entries) => entries,
            Err(Error::Unavailable(message)) => {
                warn!("gid allocation without a bound connection: {message}");
                return Ok(0);
            }
            Err(err) => return Err(err),
        };

        let highest = entries
            .iter()
            .filter_map(|entry| entry.first_u32("gidNumber"))
            .max();
        Ok(highest.map_or(0, |value| value + 1))
    }

    /// Creates a group at `cn=<cn>,<groups base dn>` and commits it.
    ///
    /// The member list is applied first; a request without members is
    /// rejected locally as `(false, entry)` and the server is never
    /// contacted for a commit. A zero gid allocates via
    /// [`Self::next_gid_number`]. Returns the server's commit flag alongside
    /// the (possibly partially populated) entry.
    pub async fn create_group(&self, request: NewGroup) -> (bool, WritableEntry) {
        let dn = self.groups_base().child("cn", request.cn.as_str());
        let mut group = self.new_entity(self.config().groups(), dn.as_str()).await;
        group.replace("member", request.members.clone());

        // A group must have at least one member at creation.
        if request.members.is_empty() {
            return (false, group);
        }

        let gid_number = if request.gid_number == 0 {
            match self.next_gid_number().await {
                Ok(gid_number) => gid_number,
                Err(err) => {
                    warn!("gid allocation for {} failed: {err}", group.dn());
                    return (false, group);
                }
            }
        } else {
            request.gid_number
        };
        group.set("gidNumber", gid_number);

        if let Some(description) = request.description {
            group.set("description", description);
        }

        let created = group.commit(self).await;
        (created, group)
    }
}
