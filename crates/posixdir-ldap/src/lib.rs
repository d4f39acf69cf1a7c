//! # posixdir-ldap
//!
//! Typed operations for managing POSIX users and groups in an LDAP
//! directory: lookup, creation, password management, group-membership
//! queries, and numeric-id allocation.
//!
//! A [`Directory`] owns the single shared connection described by a
//! [`posixdir_core::config::Configuration`]. The connection is established
//! lazily, reused while bound, and transparently re-established (once per
//! query) when the server terminates the session. Search results carry their
//! capability in the type: a read-only connection yields plain entries,
//! a read-write connection yields committable ones.
//!
//! Bind failures are reported as status (`false`, `None`, or an empty list
//! depending on the operation), never as errors, so callers can drive their
//! own fallback behavior.
//!
//! The numeric-id allocators and group creation perform check-then-act
//! sequences over server-visible state. With a single logical caller per
//! process this is safe; concurrent callers can observe the same "next" id
//! before either commits, and the duplicate is only caught if the server
//! enforces uniqueness. This is a deliberate, documented trade-off.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod directory;
mod dn;
mod entry;
mod filter;
mod groups;
mod password;
mod session;
mod users;

pub use directory::Directory;
pub use dn::{DistinguishedName, DnError, Rdn};
pub use entry::{Cursor, Entry, FetchedEntry, Modification, WritableEntry};
pub use filter::{escape_filter_value, Filter};
pub use groups::NewGroup;
pub use password::salted_sha1;
pub use session::{LdapClientConnector, LdapConnector, LdapSession, SearchScope};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = posixdir_core::Result<T>;
