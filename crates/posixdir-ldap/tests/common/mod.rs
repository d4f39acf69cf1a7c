//! In-memory directory backend for integration tests.
//!
//! Implements the session and connector traits over a shared entry map, with
//! enough filter semantics (equality, presence, substring wildcards, and/or)
//! to behave like a small server. Failure injection covers refused
//! connections and server-terminated sessions.

use async_trait::async_trait;
use posixdir_core::config::{Configuration, DirectoryLocation, ServerEndpoint};
use posixdir_core::Error;
use posixdir_ldap::{Entry, LdapConnector, LdapSession, Modification, Result, SearchScope};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=org";
pub const ADMIN_PASSWORD: &str = "adminpassword";
pub const USERS_DN: &str = "ou=people,dc=example,dc=org";
pub const GROUPS_DN: &str = "ou=groups,dc=example,dc=org";

type Attributes = HashMap<String, Vec<String>>;

#[derive(Default)]
struct State {
    entries: BTreeMap<String, Attributes>,
    unique_attributes: Vec<String>,
    failing_searches: usize,
    refuse_connections: bool,
    connect_count: usize,
    bind_count: usize,
}

/// Handle to the shared in-memory directory.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// A connector producing sessions over this backend's entry map.
    pub fn connector(&self) -> Box<dyn LdapConnector> {
        Box::new(FakeConnector {
            state: self.state.clone(),
        })
    }

    /// Inserts an entry directly, bypassing the directory operations.
    pub fn seed(&self, dn: &str, attributes: &[(&str, &[&str])]) {
        let mut state = self.state.lock().unwrap();
        let attributes = attributes
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|value| (*value).to_string()).collect(),
                )
            })
            .collect();
        state.entries.insert(dn.to_string(), attributes);
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.state.lock().unwrap().entries.contains_key(dn)
    }

    pub fn attribute(&self, dn: &str, name: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(dn)
            .and_then(|attributes| attributes.get(name).cloned())
    }

    /// Enforces server-side uniqueness of an attribute across entries, the
    /// way a directory with a unique-attribute overlay would.
    pub fn enforce_unique(&self, attribute: &str) {
        self.state
            .lock()
            .unwrap()
            .unique_attributes
            .push(attribute.to_string());
    }

    /// Makes the next `count` searches fail as server-terminated sessions.
    pub fn fail_next_searches(&self, count: usize) {
        self.state.lock().unwrap().failing_searches = count;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_connections = refuse;
    }

    pub fn bind_count(&self) -> usize {
        self.state.lock().unwrap().bind_count
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connect_count
    }
}

/// Standard test configuration matching the seeded entry layout.
pub fn test_configuration() -> Configuration {
    Configuration::new(
        vec![ServerEndpoint::new("localhost", 1389, false)],
        ADMIN_DN,
        ADMIN_PASSWORD,
    )
    .with_users_location(
        DirectoryLocation::new(USERS_DN, ["inetOrgPerson"])
            .with_auxiliary_classes(["posixAccount"]),
    )
    .with_groups_location(
        DirectoryLocation::new(GROUPS_DN, ["groupOfNames"])
            .with_auxiliary_classes(["posixGroup"]),
    )
}

/// Seeds a user entry with the standard object classes.
pub fn seed_user(backend: &FakeBackend, uid: &str, uid_number: u32) {
    let dn = format!("uid={uid},{USERS_DN}");
    let number = uid_number.to_string();
    backend.seed(
        &dn,
        &[
            ("objectClass", &["inetOrgPerson", "posixAccount"]),
            ("uid", &[uid]),
            ("uidNumber", &[&number]),
            ("gidNumber", &["2000"]),
            ("sn", &[uid]),
        ],
    );
}

/// Seeds a group entry with the standard object classes.
pub fn seed_group(backend: &FakeBackend, cn: &str, gid_number: u32, members: &[&str]) {
    let dn = format!("cn={cn},{GROUPS_DN}");
    let number = gid_number.to_string();
    backend.seed(
        &dn,
        &[
            ("objectClass", &["groupOfNames", "posixGroup"]),
            ("cn", &[cn]),
            ("gidNumber", &[&number]),
            ("member", members),
        ],
    );
}

struct FakeConnector {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl LdapConnector for FakeConnector {
    async fn connect(&self, _endpoint: &ServerEndpoint) -> Result<Box<dyn LdapSession>> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_connections {
            return Err(Error::Transport("connection refused".to_string()));
        }
        state.connect_count += 1;
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            bound: false,
        }))
    }
}

struct FakeSession {
    state: Arc<Mutex<State>>,
    bound: bool,
}

#[async_trait]
impl LdapSession for FakeSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if dn == ADMIN_DN && password == ADMIN_PASSWORD {
            self.bound = true;
            state.bind_count += 1;
            Ok(())
        } else {
            Err(Error::Directory {
                code: 49,
                message: "invalid credentials".to_string(),
            })
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        _scope: SearchScope,
        filter: &str,
        _attributes: &[&'static str],
    ) -> Result<Vec<Entry>> {
        if !self.bound {
            return Err(Error::Directory {
                code: 1,
                message: "operation on unbound session".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        if state.failing_searches > 0 {
            state.failing_searches -= 1;
            return Err(Error::SessionTerminated(
                "connection reset by server".to_string(),
            ));
        }

        let parsed = parse_filter(filter);
        let matches = state
            .entries
            .iter()
            .filter(|(dn, _)| in_subtree(dn, base_dn))
            .filter(|(_, attributes)| parsed.matches(attributes))
            .map(|(dn, attributes)| Entry::new(dn.clone(), attributes.clone()))
            .collect();
        Ok(matches)
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<()> {
        if !self.bound {
            return Err(Error::Directory {
                code: 1,
                message: "operation on unbound session".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        let Some(attributes) = state.entries.get_mut(dn) else {
            return Err(Error::Directory {
                code: 32,
                message: "no such object".to_string(),
            });
        };

        for modification in modifications {
            match modification {
                Modification::Replace { attribute, values } => {
                    attributes.insert(attribute.clone(), values.clone());
                }
                Modification::Add { attribute, values } => {
                    attributes
                        .entry(attribute.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
                Modification::Delete { attribute, values } => {
                    if values.is_empty() {
                        attributes.remove(attribute);
                    } else if let Some(existing) = attributes.get_mut(attribute) {
                        existing.retain(|value| !values.contains(value));
                        if existing.is_empty() {
                            attributes.remove(attribute);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn add(&mut self, dn: &str, attributes: Vec<(String, Vec<String>)>) -> Result<()> {
        if !self.bound {
            return Err(Error::Directory {
                code: 1,
                message: "operation on unbound session".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        if state.entries.contains_key(dn) {
            return Err(Error::Directory {
                code: 68,
                message: "entry already exists".to_string(),
            });
        }

        let attributes: Attributes = attributes.into_iter().collect();
        for unique in &state.unique_attributes {
            let Some(values) = attributes.get(unique) else {
                continue;
            };
            let conflict = state.entries.values().any(|existing| {
                existing
                    .get(unique)
                    .is_some_and(|existing_values| {
                        existing_values.iter().any(|value| values.contains(value))
                    })
            });
            if conflict {
                return Err(Error::Directory {
                    code: 19,
                    message: format!("attribute {unique} violates uniqueness constraint"),
                });
            }
        }

        state.entries.insert(dn.to_string(), attributes);
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.bound = false;
        Ok(())
    }
}

fn in_subtree(dn: &str, base_dn: &str) -> bool {
    dn == base_dn || dn.ends_with(&format!(",{base_dn}"))
}

enum TestFilter {
    Eq(String, String),
    Present(String),
    And(Vec<TestFilter>),
    Or(Vec<TestFilter>),
}

impl TestFilter {
    fn matches(&self, attributes: &Attributes) -> bool {
        match self {
            Self::Eq(attribute, pattern) => attributes
                .get(attribute)
                .is_some_and(|values| values.iter().any(|value| value_matches(pattern, value))),
            Self::Present(attribute) => attributes.contains_key(attribute),
            Self::And(filters) => filters.iter().all(|filter| filter.matches(attributes)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(attributes)),
        }
    }
}

/// Matches a raw (still-escaped) filter value pattern against an attribute
/// value. Unescaped `*` act as wildcards, exactly like a real server; escaped
/// metacharacters compare literally.
fn value_matches(pattern: &str, value: &str) -> bool {
    let segments: Vec<String> = pattern.split('*').map(unescape_value).collect();
    if segments.len() == 1 {
        return segments[0] == value;
    }

    let mut remaining = value;
    let last = segments.len() - 1;
    for (index, segment) in segments.iter().enumerate() {
        if index == 0 {
            let Some(rest) = remaining.strip_prefix(segment.as_str()) else {
                return false;
            };
            remaining = rest;
        } else if index == last {
            return remaining.ends_with(segment.as_str());
        } else if let Some(position) = remaining.find(segment.as_str()) {
            remaining = &remaining[position + segment.len()..];
        } else {
            return false;
        }
    }
    true
}

fn unescape_value(escaped: &str) -> String {
    let mut result = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        let high = chars.next().expect("escape sequence has two hex digits");
        let low = chars.next().expect("escape sequence has two hex digits");
        let code = u8::from_str_radix(&format!("{high}{low}"), 16)
            .expect("escape sequence is hexadecimal");
        result.push(code as char);
    }
    result
}

/// Parses the filter subset the crate generates: equality, presence, and
/// and/or composition. Panics on anything else; a malformed filter is a test
/// failure.
fn parse_filter(input: &str) -> TestFilter {
    let (filter, rest) = parse_component(input);
    assert!(rest.is_empty(), "trailing filter input: {rest}");
    filter
}

fn parse_component(input: &str) -> (TestFilter, &str) {
    let inner = input.strip_prefix('(').expect("filter component starts with (");
    match inner.chars().next() {
        Some('&') => parse_set(&inner[1..], true),
        Some('|') => parse_set(&inner[1..], false),
        _ => {
            let end = inner.find(')').expect("filter component ends with )");
            let component = &inner[..end];
            let (attribute, value) = component
                .split_once('=')
                .expect("filter component contains =");
            let filter = if value == "*" {
                TestFilter::Present(attribute.to_string())
            } else {
                TestFilter::Eq(attribute.to_string(), value.to_string())
            };
            (filter, &inner[end + 1..])
        }
    }
}

fn parse_set(mut input: &str, conjunction: bool) -> (TestFilter, &str) {
    let mut children = Vec::new();
    while input.starts_with('(') {
        let (child, rest) = parse_component(input);
        children.push(child);
        input = rest;
    }
    let rest = input.strip_prefix(')').expect("filter set ends with )");
    let filter = if conjunction {
        TestFilter::And(children)
    } else {
        TestFilter::Or(children)
    };
    (filter, rest)
}
