//! rsprovision Configuration
//!
//! This module provides configuration structures for the replica set
//! provisioner. Every field carries a default so an empty file describes a
//! standalone node with no replica set and no authentication.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::replset::ReplicaSetMode;

/// Main provisioner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Filesystem layout of the installation
    #[serde(default)]
    pub paths: PathsConfig,

    /// Users created on a fresh deployment
    #[serde(default)]
    pub auth: AuthConfig,

    /// Target replica set topology
    #[serde(default)]
    pub replica_set: ReplicaSetConfig,

    /// Values used when rendering the default config file
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Convergence poll timing
    #[serde(default)]
    pub poll: PollConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Port the database daemon listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address other members use to reach this node (machine IP when unset)
    #[serde(default)]
    pub advertised_hostname: Option<String>,

    /// Unprivileged user owning the data when provisioning runs as root
    #[serde(default = "default_system_user")]
    pub system_user: String,

    /// Group owning the data when provisioning runs as root
    #[serde(default = "default_system_group")]
    pub system_group: String,
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the daemon and shell binaries
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,

    /// Directory holding mongodb.conf and the key file
    #[serde(default = "default_conf_dir")]
    pub conf_dir: PathBuf,

    /// Working data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Persistent volume mount point
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,

    /// Log directory
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Scratch directory (pid file, sockets)
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Where the monit stanza is written
    #[serde(default = "default_monit_file")]
    pub monit_file: PathBuf,

    /// Where the logrotate stanza is written
    #[serde(default = "default_logrotate_file")]
    pub logrotate_file: PathBuf,
}

/// Authentication settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Password of the `root` user on the primary or a standalone node
    #[serde(default)]
    pub root_password: Option<String>,

    /// Application user
    #[serde(default)]
    pub username: Option<String>,

    /// Application user password
    #[serde(default)]
    pub password: Option<String>,

    /// Application database
    #[serde(default)]
    pub database: Option<String>,
}

/// Replica set settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaSetConfig {
    /// Declared role; no replica set when unset
    #[serde(default)]
    pub mode: Option<ReplicaSetMode>,

    /// Replica set name
    #[serde(default = "default_replica_set_name")]
    pub name: String,

    /// Shared secret written to the key file
    #[serde(default)]
    pub key: Option<String>,

    /// Primary host (secondary and arbiter only)
    #[serde(default)]
    pub primary_host: Option<String>,

    /// Primary port
    #[serde(default = "default_port")]
    pub primary_port: u16,

    /// Administrative user on the primary
    #[serde(default = "default_primary_root_user")]
    pub primary_root_user: String,

    /// Password of the administrative user on the primary
    #[serde(default)]
    pub primary_root_password: Option<String>,

    /// Enable majority read concern
    #[serde(default = "default_true")]
    pub enable_majority_read_concern: bool,

    /// Upper bound for the initial sync wait of a fresh secondary
    #[serde(default = "default_sync_wait_timeout")]
    pub sync_wait_timeout_secs: u64,
}

/// Default config file rendering options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub enable_ipv6: bool,

    #[serde(default)]
    pub enable_directory_per_db: bool,

    #[serde(default)]
    pub disable_system_log: bool,
}

/// Convergence poll timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Total time a convergence wait may take, in seconds
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,

    /// Fixed interval between attempts, in seconds
    #[serde(default = "default_poll_step")]
    pub step_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_port() -> u16 {
    27017
}

fn default_system_user() -> String {
    "mongo".to_string()
}

fn default_system_group() -> String {
    "mongo".to_string()
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("/opt/mongodb/bin")
}

fn default_conf_dir() -> PathBuf {
    PathBuf::from("/opt/mongodb/conf")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/opt/mongodb/data")
}

fn default_persist_dir() -> PathBuf {
    PathBuf::from("/persist/mongodb")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("/opt/mongodb/logs")
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("/opt/mongodb/tmp")
}

fn default_monit_file() -> PathBuf {
    PathBuf::from("/etc/monit/conf.d/mongodb.conf")
}

fn default_logrotate_file() -> PathBuf {
    PathBuf::from("/etc/logrotate.d/mongodb")
}

fn default_replica_set_name() -> String {
    "replicaset".to_string()
}

fn default_primary_root_user() -> String {
    "root".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sync_wait_timeout() -> u64 {
    10
}

fn default_poll_timeout() -> u64 {
    90
}

fn default_poll_step() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            advertised_hostname: None,
            system_user: default_system_user(),
            system_group: default_system_group(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            bin_dir: default_bin_dir(),
            conf_dir: default_conf_dir(),
            data_dir: default_data_dir(),
            persist_dir: default_persist_dir(),
            logs_dir: default_logs_dir(),
            tmp_dir: default_tmp_dir(),
            monit_file: default_monit_file(),
            logrotate_file: default_logrotate_file(),
        }
    }
}

impl Default for ReplicaSetConfig {
    fn default() -> Self {
        Self {
            mode: None,
            name: default_replica_set_name(),
            key: None,
            primary_host: None,
            primary_port: default_port(),
            primary_root_user: default_primary_root_user(),
            primary_root_password: None,
            enable_majority_read_concern: true,
            sync_wait_timeout_secs: default_sync_wait_timeout(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_poll_timeout(),
            step_secs: default_poll_step(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl PathsConfig {
    /// Generated or externally mounted daemon configuration
    pub fn conf_file(&self) -> PathBuf {
        self.conf_dir.join("mongodb.conf")
    }

    /// Shared replica set secret
    pub fn key_file(&self) -> PathBuf {
        self.conf_dir.join("keyfile")
    }

    /// Daemon log, polled for the initial sync marker
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir.join("mongodb.log")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.tmp_dir.join("mongodb.pid")
    }

    /// Database files inside the working data directory
    pub fn db_dir(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    /// Database files inside the persistent volume
    pub fn persisted_db_dir(&self) -> PathBuf {
        self.persist_dir.join("data").join("db")
    }
}

impl ProvisionConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let mut config: ProvisionConfig = toml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Treat empty strings as absent values
    pub fn normalize(&mut self) {
        for field in [
            &mut self.node.advertised_hostname,
            &mut self.auth.root_password,
            &mut self.auth.username,
            &mut self.auth.password,
            &mut self.auth.database,
            &mut self.replica_set.key,
            &mut self.replica_set.primary_host,
            &mut self.replica_set.primary_root_password,
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                *field = None;
            }
        }
    }

    /// Validate structural sanity of the configuration
    ///
    /// Role and authentication consistency is checked separately, right
    /// before a fresh deployment mutates anything.
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.port == 0 {
            return Err(crate::Error::Config("node.port cannot be 0".into()));
        }

        if self.replica_set.primary_port == 0 {
            return Err(crate::Error::Config("replica_set.primary_port cannot be 0".into()));
        }

        if self.replica_set.name.is_empty() {
            return Err(crate::Error::Config("replica_set.name cannot be empty".into()));
        }

        if self.poll.step_secs == 0 {
            return Err(crate::Error::Config("poll.step_secs cannot be 0".into()));
        }

        Ok(())
    }

    /// Get poll timeout as Duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll.timeout_secs)
    }

    /// Get poll step as Duration
    pub fn poll_step(&self) -> Duration {
        Duration::from_secs(self.poll.step_secs)
    }

    /// Get the initial sync wait as Duration
    pub fn sync_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.replica_set.sync_wait_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[node]
port = 27018
advertised_hostname = "mongodb-secondary-0"

[replica_set]
mode = "secondary"
name = "rs0"
key = "s3cr3tkey"
primary_host = "mongodb-primary"
primary_root_password = "rootpw"

[paths]
conf_dir = "/srv/mongodb/conf"
"#;

        let config = ProvisionConfig::from_str(toml).unwrap();
        assert_eq!(config.node.port, 27018);
        assert_eq!(config.replica_set.mode, Some(ReplicaSetMode::Secondary));
        assert_eq!(config.replica_set.primary_port, 27017);
        assert_eq!(config.replica_set.primary_root_user, "root");
        assert_eq!(config.paths.key_file(), PathBuf::from("/srv/mongodb/conf/keyfile"));
        assert_eq!(config.poll_timeout(), Duration::from_secs(90));
        assert_eq!(config.poll_step(), Duration::from_secs(5));
    }

    #[test]
    fn test_empty_config_is_standalone() {
        let config = ProvisionConfig::from_str("").unwrap();
        assert!(config.replica_set.mode.is_none());
        assert!(config.auth.root_password.is_none());
        assert_eq!(config.replica_set.name, "replicaset");
        assert!(config.replica_set.enable_majority_read_concern);
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let toml = r#"
[auth]
root_password = ""
username = "app"

[replica_set]
primary_host = ""
"#;
        let config = ProvisionConfig::from_str(toml).unwrap();
        assert!(config.auth.root_password.is_none());
        assert_eq!(config.auth.username.as_deref(), Some("app"));
        assert!(config.replica_set.primary_host.is_none());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let toml = r#"
[replica_set]
mode = "leader"
"#;
        assert!(ProvisionConfig::from_str(toml).is_err());
    }

    #[test]
    fn test_zero_step_rejected() {
        let toml = r#"
[poll]
step_secs = 0
"#;
        assert!(matches!(
            ProvisionConfig::from_str(toml),
            Err(crate::Error::Config(_))
        ));
    }
}
