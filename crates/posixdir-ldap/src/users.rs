//! User entity operations.

use crate::directory::Directory;
use crate::entry::{FetchedEntry, Modification, WritableEntry};
use crate::password;
use crate::Result;
use posixdir_core::Error;
use tracing::warn;

/// Attributes fetched by the uid-allocation scan.
const UID_SCAN_ATTRIBUTES: &[&str] = &["uidNumber"];

// uidNumber is only provided by the posixAccount schema, so the scan filter
// does not need to be configurable beyond the base DN.
const POSIX_ACCOUNT_FILTER: &str = "(objectClass=posixAccount)";

impl Directory {
    /// Fetches a single user by account name.
    ///
    /// # Errors
    ///
    /// [`Error::TooManyResults`] when the uid is ambiguous. An unavailable
    /// directory returns `Ok(None)`.
    pub async fn get_user(&self, uid: &str) -> Result<Option<FetchedEntry>> {
        self.get_single_object(self.config().users(), "uid", uid)
            .await
    }

    /// Constructs a new, uncommitted user entry at
    /// `uid=<uid>,<users base dn>`.
    ///
    /// The entry carries the configured user object classes. Nothing is
    /// written until the caller populates it and commits; check
    /// [`WritableEntry::is_attached`] first.
    pub async fn new_user(&self, uid: &str) -> WritableEntry {
        let dn = self.users_base().child("uid", uid);
        self.new_entity(self.config().users(), dn.as_str()).await
    }

    /// Finds the next unused POSIX user id.
    ///
    /// Scans every `posixAccount` entry under the users location and returns
    /// the highest `uidNumber` plus one, or `0` when none exist (including
    /// when no connection is available). The scan is uncached and costs a
    /// full directory pass each call; nothing guards two concurrent callers
    /// from computing the same id before either commits.
    ///
    /// # Errors
    ///
    /// Directory errors other than unavailability propagate.
    pub async fn next_uid_number(&self) -> Result<u32> {
        let entries = match self
            .execute_search(
                self.config().users().base_dn(),
                POSIX_ACCOUNT_FILTER,
                UID_SCAN_ATTRIBUTES,
            )
            .await
        {
            Ok(entries) => entries,
            Err(Error::Unavailable(message)) => {
                warn!("uid allocation without a bound connection: {message}");
                return Ok(0);
            }
            Err(err) => return Err(err),
        };

        let highest = entries
            .iter()
            .filter_map(|entry| entry.first_u32("uidNumber"))
            .max();
        Ok(highest.map_or(0, |value| value + 1))
    }

    /// Replaces the password of the entry at `dn`.
    ///
    /// The password is hashed with the salted SHA-1 scheme before it leaves
    /// the process. Returns the server's success flag; fails closed with
    /// `false` when no bound connection is available.
    pub async fn set_user_password(&self, dn: &str, password: &str) -> bool {
        let change = [Modification::Replace {
            attribute: "userPassword".to_string(),
            values: vec![password::salted_sha1(password)],
        }];
        match self.apply_modify(dn, &change).await {
            Ok(()) => true,
            Err(err) => {
                warn!("password update for {dn} failed: {err}");
                false
            }
        }
    }
}
