#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `config` holds the explicit [`Config`] value every DTail program builds
//! once at start-up and passes into its constructors. It has three sections:
//! [`CommonConfig`] shared by all programs, [`ClientConfig`] and
//! [`ServerConfig`].
//!
//! # Design
//!
//! Values are layered in a fixed order:
//!
//! 1. Built-in defaults ([`Default`] on every section).
//! 2. The optional JSON file (`-cfg PATH`), whose keys use the PascalCase
//!    spelling (`"Common": {"SSHPort": 2222}`); absent keys keep their
//!    defaults.
//! 3. Environment variables ([`ENV_HOSTNAME_OVERRIDE`],
//!    [`ENV_KNOWN_HOSTS_FILE`], [`ENV_INTEGRATION_TEST_RUN_MODE`]).
//! 4. Command-line flags, applied by the `cli` crate.
//!
//! # Errors
//!
//! Loading reports unreadable or malformed files and invalid permission
//! regexes as [`ConfigError`].
//!
//! # Examples
//!
//! ```
//! let config: config::Config = serde_json::from_str(
//!     r#"{ "Server": { "MaxConcurrentCats": 4 } }"#,
//! ).unwrap();
//! assert_eq!(config.server.max_concurrent_cats, 4);
//! assert_eq!(config.server.max_concurrent_tails, 50);
//! assert_eq!(config.common.ssh_port, 2222);
//! ```

mod error;
mod jobs;
mod permissions;

use std::fs;
use std::path::{Path, PathBuf};

use logging::LogLevel;
use serde::{Deserialize, Serialize};

pub use error::ConfigError;
pub use jobs::{ContinuousJob, ScheduledJob};
pub use permissions::{PermissionKind, PermissionRule, PermissionSet, Permissions};

/// Overrides the host name reported in frames and stats.
pub const ENV_HOSTNAME_OVERRIDE: &str = "DTAIL_HOSTNAME_OVERRIDE";
/// Overrides the known hosts file location.
pub const ENV_KNOWN_HOSTS_FILE: &str = "DTAIL_SSH_KNOWN_HOSTS_FILE";
/// Marks an integration test run.
pub const ENV_INTEGRATION_TEST_RUN_MODE: &str = "DTAIL_INTEGRATION_TEST_RUN_MODE";

/// Default SSH port of `dserver`.
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Settings shared by every program.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CommonConfig {
    /// Port used for endpoints without an explicit port, and by the server.
    #[serde(rename = "SSHPort")]
    pub ssh_port: u16,
    /// Log threshold.
    pub log_level: LogLevel,
    /// Directory for the host key and per-user authorized keys.
    pub cache_dir: PathBuf,
    /// Host name to report instead of the system one.
    pub hostname_override: Option<String>,
    /// Known hosts file; `None` means `$HOME/.ssh/known_hosts`.
    pub known_hosts_file: Option<PathBuf>,
    /// Relaxes checks that need real infrastructure.
    pub integration_test_mode: bool,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            ssh_port: DEFAULT_SSH_PORT,
            log_level: LogLevel::Info,
            cache_dir: PathBuf::from("cache"),
            hostname_override: None,
            known_hosts_file: None,
            integration_test_mode: false,
        }
    }
}

impl CommonConfig {
    /// Host name to report: the override if any, else the system host name.
    pub fn hostname(&self) -> String {
        if let Some(name) = self.hostname_override.as_ref().filter(|name| !name.is_empty()) {
            return name.clone();
        }
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .map_or_else(|| "localhost".to_owned(), |name| short_hostname(&name))
    }

    /// Resolved known hosts file.
    pub fn known_hosts_path(&self) -> PathBuf {
        if let Some(path) = &self.known_hosts_file {
            return path.clone();
        }
        home_dir().join(".ssh").join("known_hosts")
    }
}

fn short_hostname(name: &str) -> String {
    name.split('.').next().unwrap_or(name).to_owned()
}

/// The invoking user's home directory, `.` when unknown.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from)
}

/// Client settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ClientConfig {
    /// Simultaneous session establishments per CPU.
    pub connections_per_cpu: usize,
    /// Seconds between client stats lines.
    pub stats_interval_secs: u64,
    /// SSH dial timeout in seconds.
    pub dial_timeout_secs: u64,
    /// Trust unknown host keys without asking.
    pub trust_all_hosts: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connections_per_cpu: 10,
            stats_interval_secs: 5,
            dial_timeout_secs: 3,
            trust_all_hosts: false,
        }
    }
}

/// Server settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ServerConfig {
    /// Address the SSH listener binds to.
    #[serde(rename = "SSHBindAddress")]
    pub ssh_bind_address: String,
    /// Concurrent sessions before new ones are refused.
    pub max_connections: usize,
    /// Concurrent `cat`/`grep` readers.
    pub max_concurrent_cats: usize,
    /// Concurrent `tail` readers.
    pub max_concurrent_tails: usize,
    /// Lines longer than this are split.
    pub max_line_length: usize,
    /// Host key file; relative paths resolve against the working directory.
    pub host_key_file: PathBuf,
    /// Seconds between server stats lines.
    pub stats_interval_secs: u64,
    /// Log format used by the server side of `map` when the query names none.
    #[serde(rename = "MapreduceLogFormat")]
    pub mapr_log_format: String,
    /// Access rules.
    pub permissions: Permissions,
    /// Scheduled jobs.
    pub schedule: Vec<ScheduledJob>,
    /// Continuous jobs.
    pub continuous: Vec<ContinuousJob>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ssh_bind_address: "0.0.0.0".to_owned(),
            max_connections: 50,
            max_concurrent_cats: 2,
            max_concurrent_tails: 50,
            max_line_length: 1024 * 1024,
            host_key_file: PathBuf::from("cache/ssh_host_key"),
            stats_interval_secs: 10,
            mapr_log_format: "default".to_owned(),
            permissions: Permissions::default(),
            schedule: Vec::new(),
            continuous: Vec::new(),
        }
    }
}

/// The complete configuration of one process.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// Shared settings.
    pub common: CommonConfig,
    /// Client settings.
    pub client: ClientConfig,
    /// Server settings.
    pub server: ServerConfig,
}

impl Config {
    /// Loads the file at `path` (if any), then applies environment overrides.
    ///
    /// The special path `none` skips the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path != Path::new("none") => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses one JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup(ENV_HOSTNAME_OVERRIDE).filter(|v| !v.is_empty()) {
            self.common.hostname_override = Some(name);
        }
        if let Some(path) = lookup(ENV_KNOWN_HOSTS_FILE).filter(|v| !v.is_empty()) {
            self.common.known_hosts_file = Some(PathBuf::from(path));
        }
        if let Some(mode) = lookup(ENV_INTEGRATION_TEST_RUN_MODE) {
            self.common.integration_test_mode = matches!(mode.as_str(), "yes" | "true" | "1");
        }
    }

    /// Checks ranges and compiles permission rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.common.ssh_port == 0 {
            return Err(ConfigError::Invalid("SSHPort must be in 1..=65535".to_owned()));
        }
        if self.server.max_line_length == 0 {
            return Err(ConfigError::Invalid("MaxLineLength must be positive".to_owned()));
        }
        self.server.permissions.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.common.ssh_port, 2222);
        assert_eq!(config.client.connections_per_cpu, 10);
        assert_eq!(config.client.dial_timeout_secs, 3);
        assert_eq!(config.server.max_concurrent_cats, 2);
        assert_eq!(config.server.max_concurrent_tails, 50);
        assert_eq!(config.server.max_line_length, 1_048_576);
        assert_eq!(config.server.host_key_file, PathBuf::from("cache/ssh_host_key"));
    }

    #[test]
    fn environment_overrides_apply() {
        let env: HashMap<&str, &str> = [
            (ENV_HOSTNAME_OVERRIDE, "web42"),
            (ENV_KNOWN_HOSTS_FILE, "/tmp/known"),
            (ENV_INTEGRATION_TEST_RUN_MODE, "yes"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| (*v).to_owned()));
        assert_eq!(config.common.hostname(), "web42");
        assert_eq!(config.common.known_hosts_path(), PathBuf::from("/tmp/known"));
        assert!(config.common.integration_test_mode);
    }

    #[test]
    fn system_hostname_is_shortened() {
        assert_eq!(short_hostname("web01.example.org"), "web01");
        assert_eq!(short_hostname("web01"), "web01");
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = Config::default();
        config.common.ssh_port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
