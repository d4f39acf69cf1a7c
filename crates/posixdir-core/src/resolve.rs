//! Configuration resolution.
//!
//! Three sources are tried in priority order, first success wins:
//!
//! 1. **Host settings**: a JSON value handed over by the embedding
//!    application ([`Resolver::with_settings`]).
//! 2. **Configuration file**: JSON at one of several well-known paths,
//!    most specific first.
//! 3. **Environment variables**: always succeeds; every field has a
//!    documented default, so the resolver can never leave the system
//!    unconfigured.

use crate::config::{
    Configuration, DirectoryLocation, ServerEndpoint, DEFAULT_BIND_DN,
    DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_GROUP_BASE_DN, DEFAULT_GROUP_CLASS,
    DEFAULT_URI, DEFAULT_USER_BASE_DN, DEFAULT_USER_CLASS,
};
use crate::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use validator::Validate;

/// Environment variable naming an additional configuration file path.
pub const ENV_CONFIG_PATH: &str = "POSIXDIR_CONFIG_PATH";

/// System-wide configuration file path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/posixdir/ldap.json";

/// Per-user configuration file name, looked up under `$HOME`.
pub const USER_CONFIG_FILE: &str = ".posixdir.json";

/// JSON configuration schema, shared by the host-settings and file sources.
///
/// Every field is optional; omitted fields take the documented defaults.
#[derive(Debug, Deserialize, Validate)]
struct RawConfig {
    #[serde(default)]
    uri: Option<UriField>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    readonly: Option<bool>,
    #[validate(range(min = 1, max = 300))]
    #[serde(default)]
    connection_timeout: Option<u64>,
    #[serde(default)]
    users: Option<RawLocation>,
    #[serde(default)]
    groups: Option<RawLocation>,
}

/// The `uri` field accepts a single URI or a list tried in order.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UriField {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(default)]
    dn: Option<String>,
    #[serde(default)]
    object_classes: Option<Vec<String>>,
    #[serde(default)]
    auxiliary_classes: Option<Vec<String>>,
}

impl RawConfig {
    fn into_configuration(self) -> Result<Configuration> {
        self.validate()?;

        let uris = match self.uri {
            None => DEFAULT_URI.to_string(),
            Some(UriField::One(uri)) => uri,
            Some(UriField::Many(list)) => list.join(" "),
        };
        let servers = ServerEndpoint::from_uri_list(&uris)?;

        let users = raw_location(self.users, DEFAULT_USER_BASE_DN, DEFAULT_USER_CLASS);
        let groups = raw_location(self.groups, DEFAULT_GROUP_BASE_DN, DEFAULT_GROUP_CLASS);

        let config = Configuration::new(
            servers,
            self.username.unwrap_or_else(|| DEFAULT_BIND_DN.to_string()),
            self.password.unwrap_or_default(),
        )
        .with_read_only(self.readonly.unwrap_or(false))
        .with_connection_timeout_secs(
            self.connection_timeout
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_SECS),
        )
        .with_users_location(users)
        .with_groups_location(groups);

        config.validate()?;
        Ok(config)
    }
}

fn raw_location(
    raw: Option<RawLocation>,
    default_dn: &str,
    default_class: &str,
) -> DirectoryLocation {
    let raw = raw.unwrap_or(RawLocation {
        dn: None,
        object_classes: None,
        auxiliary_classes: None,
    });
    DirectoryLocation::new(
        raw.dn.unwrap_or_else(|| default_dn.to_string()),
        raw.object_classes
            .unwrap_or_else(|| vec![default_class.to_string()]),
    )
    .with_auxiliary_classes(raw.auxiliary_classes.unwrap_or_default())
}

/// Parses a configuration from an already-loaded JSON value.
///
/// # Errors
///
/// Returns [`crate::Error::Config`] if the value does not match the schema or
/// fails validation.
pub fn from_value(value: serde_json::Value) -> Result<Configuration> {
    let raw: RawConfig = serde_json::from_value(value)?;
    raw.into_configuration()
}

/// Loads and parses a JSON configuration file.
///
/// # Errors
///
/// Returns [`crate::Error::Config`] if the file cannot be read, parsed, or
/// validated.
pub fn from_file(path: &Path) -> Result<Configuration> {
    let data = std::fs::read_to_string(path).map_err(|err| {
        crate::Error::Config(format!(
            "failed to read configuration file {}: {err}",
            path.display()
        ))
    })?;
    from_value(serde_json::from_str(&data)?)
}

/// Configuration resolver applying the source precedence rules.
///
/// The resolved [`Configuration`] is intended to be produced once and handed
/// to the long-lived directory manager; the resolver itself holds no shared
/// state.
#[derive(Debug, Default)]
pub struct Resolver {
    settings: Option<serde_json::Value>,
    extra_path: Option<PathBuf>,
}

impl Resolver {
    /// Creates a resolver with no host settings and the default file paths.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Provides host-application settings, the highest-priority source.
    #[must_use]
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Adds an explicit configuration file path, tried before the well-known
    /// locations.
    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_path = Some(path.into());
        self
    }

    /// Resolves a configuration, falling through the sources in order.
    ///
    /// This never fails: the environment source supplies defaults for every
    /// field.
    #[must_use]
    pub fn resolve(&self) -> Configuration {
        if let Some(config) = self.from_settings() {
            debug!("configuration resolved from host settings");
            return config;
        }
        if let Some(config) = self.from_files() {
            return config;
        }
        debug!("configuration resolved from environment");
        environment_configuration(&env::vars().collect())
    }

    fn from_settings(&self) -> Option<Configuration> {
        let value = self.settings.clone()?;
        match from_value(value) {
            Ok(config) => Some(config),
            Err(err) => {
                warn!("host settings rejected: {err}");
                None
            }
        }
    }

    fn candidate_paths(&self) -> Vec<PathBuf> {
        // Most specific first.
        let mut paths = Vec::new();
        if let Some(path) = &self.extra_path {
            paths.push(path.clone());
        }
        if let Some(path) = env::var_os(ENV_CONFIG_PATH) {
            paths.push(PathBuf::from(path));
        }
        if let Some(home) = env::var_os("HOME") {
            paths.push(PathBuf::from(home).join(USER_CONFIG_FILE));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
        paths
    }

    fn from_files(&self) -> Option<Configuration> {
        for path in self.candidate_paths() {
            if !path.is_file() {
                continue;
            }
            match from_file(&path) {
                Ok(config) => {
                    debug!("configuration resolved from {}", path.display());
                    return Some(config);
                }
                Err(err) => {
                    warn!("skipping configuration file {}: {err}", path.display());
                }
            }
        }
        None
    }
}

fn list_var(vars: &HashMap<String, String>, key: &str, default: &[&str]) -> Vec<String> {
    match vars.get(key).filter(|value| !value.is_empty()) {
        Some(value) => value.split(',').map(|item| item.trim().to_string()).collect(),
        None => default.iter().map(|item| (*item).to_string()).collect(),
    }
}

fn string_var(vars: &HashMap<String, String>, key: &str, default: &str) -> String {
    vars.get(key)
        .filter(|value| !value.is_empty())
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

/// Builds a configuration from an environment-variable map.
///
/// Infallible by design: unparsable values fall back to the documented
/// defaults with a warning.
fn environment_configuration(vars: &HashMap<String, String>) -> Configuration {
    let uris = string_var(vars, "POSIXDIR_LDAP_URI", DEFAULT_URI);
    let servers = match ServerEndpoint::from_uri_list(&uris) {
        Ok(servers) => servers,
        Err(err) => {
            warn!("ignoring POSIXDIR_LDAP_URI: {err}");
            vec![ServerEndpoint::new("localhost", 389, false)]
        }
    };

    // The environment source defaults to read-only; only an explicit
    // "false" opts into mutations.
    let read_only = vars
        .get("POSIXDIR_LDAP_READONLY")
        .map_or(true, |value| !value.eq_ignore_ascii_case("false"));

    let users = DirectoryLocation::new(
        string_var(vars, "POSIXDIR_USER_DN", DEFAULT_USER_BASE_DN),
        list_var(vars, "POSIXDIR_USER_CLASSES", &[DEFAULT_USER_CLASS]),
    )
    .with_auxiliary_classes(list_var(vars, "POSIXDIR_USER_AUX", &[]));

    let groups = DirectoryLocation::new(
        string_var(vars, "POSIXDIR_GROUP_DN", DEFAULT_GROUP_BASE_DN),
        list_var(vars, "POSIXDIR_GROUP_CLASSES", &[DEFAULT_GROUP_CLASS]),
    )
    .with_auxiliary_classes(list_var(vars, "POSIXDIR_GROUP_AUX", &[]));

    Configuration::new(
        servers,
        string_var(vars, "POSIXDIR_USERNAME", DEFAULT_BIND_DN),
        string_var(vars, "POSIXDIR_PASSWORD", ""),
    )
    .with_read_only(read_only)
    .with_users_location(users)
    .with_groups_location(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, value: &serde_json::Value) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{value}").unwrap();
        path
    }

    #[test]
    fn file_source_parses_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "ldap.json",
            &json!({
                "uri": "ldap://localhost:1389",
                "username": "cn=admin,dc=example,dc=org",
                "password": "adminpassword",
                "readonly": false,
                "users": {
                    "dn": "ou=people,dc=example,dc=org",
                    "object_classes": ["inetOrgPerson"],
                    "auxiliary_classes": ["posixAccount"]
                }
            }),
        );

        let config = from_file(&path).unwrap();
        assert!(!config.read_only());
        assert_eq!(config.servers()[0].port(), 1389);
        assert_eq!(config.users().base_dn(), "ou=people,dc=example,dc=org");
        assert_eq!(config.users().auxiliary_classes(), ["posixAccount"]);
        // Unspecified category falls back entirely to defaults.
        assert_eq!(config.groups().base_dn(), DEFAULT_GROUP_BASE_DN);
        assert_eq!(config.groups().object_classes(), [DEFAULT_GROUP_CLASS]);
    }

    #[test]
    fn file_source_accepts_uri_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "ldap.json",
            &json!({"uri": ["ldap://primary", "ldaps://fallback"]}),
        );

        let config = from_file(&path).unwrap();
        assert_eq!(config.servers().len(), 2);
        assert!(config.servers()[1].use_tls());
    }

    #[test]
    fn file_source_rejects_out_of_range_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "ldap.json", &json!({"connection_timeout": 0}));
        assert!(from_file(&path).is_err());
    }

    #[test]
    fn settings_take_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "ldap.json", &json!({"username": "cn=file"}));

        let config = Resolver::new()
            .with_settings(json!({"username": "cn=host,dc=example,dc=org"}))
            .with_config_path(&path)
            .resolve();
        assert_eq!(config.bind_dn(), "cn=host,dc=example,dc=org");
    }

    #[test]
    fn invalid_settings_fall_through_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "ldap.json",
            &json!({"username": "cn=file,dc=example,dc=org"}),
        );

        let config = Resolver::new()
            .with_settings(json!({"uri": "not a uri"}))
            .with_config_path(&path)
            .resolve();
        assert_eq!(config.bind_dn(), "cn=file,dc=example,dc=org");
    }

    #[test]
    fn environment_defaults() {
        let config = environment_configuration(&HashMap::new());
        assert!(config.read_only());
        assert_eq!(config.bind_dn(), DEFAULT_BIND_DN);
        assert_eq!(config.bind_password(), "");
        assert_eq!(config.servers()[0].host(), "localhost");
        assert_eq!(config.users().base_dn(), DEFAULT_USER_BASE_DN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<String, String> = [
            ("POSIXDIR_LDAP_URI", "ldaps://dir.example.org ldap://backup"),
            ("POSIXDIR_LDAP_READONLY", "False"),
            ("POSIXDIR_USER_DN", "ou=people,dc=example,dc=org"),
            ("POSIXDIR_USER_CLASSES", "inetOrgPerson,shadowAccount"),
            ("POSIXDIR_USER_AUX", "posixAccount"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

        let config = environment_configuration(&vars);
        assert!(!config.read_only());
        assert_eq!(config.servers().len(), 2);
        assert_eq!(
            config.users().object_classes(),
            ["inetOrgPerson", "shadowAccount"]
        );
        assert_eq!(config.users().auxiliary_classes(), ["posixAccount"]);
    }

    #[test]
    fn environment_survives_bad_uri() {
        let vars: HashMap<String, String> =
            [("POSIXDIR_LDAP_URI".to_string(), "garbage".to_string())]
                .into_iter()
                .collect();
        let config = environment_configuration(&vars);
        assert_eq!(config.servers()[0].host(), "localhost");
    }
}
