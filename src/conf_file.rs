//! Daemon Configuration File
//!
//! Line-oriented `key: value` file. Edits only ever rewrite a line that is
//! already present (commented or not); a missing key is an error.

use std::path::{Path, PathBuf};

use regex::{NoExpand, Regex, RegexBuilder};

use crate::config::{DefaultsConfig, PathsConfig};
use crate::error::{Error, Result};

/// Who owns the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigProvider {
    /// Rendered by the provisioner, editable
    Generated,
    /// Mounted by the operator, never edited
    External,
}

/// Handle on the daemon config file
#[derive(Debug, Clone)]
pub struct ConfFile {
    path: PathBuf,
}

impl ConfFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Render the default config unless one is already present
    pub fn ensure_default(&self, paths: &PathsConfig, defaults: &DefaultsConfig, port: u16) -> Result<ConfigProvider> {
        if self.exists() {
            tracing::info!("==> Configuration files found...");
            return Ok(ConfigProvider::External);
        }

        tracing::info!("==> No injected configuration files found. Creating default config files...");
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, render_default(paths, defaults, port))?;
        Ok(ConfigProvider::Generated)
    }

    /// Rewrite the first `#?<key>:` line as `<key>: <value>`
    pub fn substitute(&self, key: &str, value: &str) -> Result<()> {
        let content = std::fs::read_to_string(&self.path)?;
        let pattern = Regex::new(&format!("#?{}:.*", regex::escape(key)))?;

        if !pattern.is_match(&content) {
            return Err(Error::ConfigSubstitution {
                key: key.to_string(),
                path: self.path.clone(),
            });
        }

        let line = format!("{}: {}", key, value);
        let updated = pattern.replacen(&content, 1, NoExpand(&line));
        std::fs::write(&self.path, updated.as_bytes())?;
        tracing::trace!("Set '{}' in {:?}", line, self.path);
        Ok(())
    }

    /// Apply several substitutions in order, stopping at the first missing key
    pub fn configure(&self, properties: &[(&str, String)]) -> Result<()> {
        for (key, value) in properties {
            self.substitute(key, value)?;
        }
        Ok(())
    }

    /// Whether any line matches `pattern` (`^`/`$` anchor at line boundaries)
    pub fn contains(&self, pattern: &str) -> Result<bool> {
        let content = std::fs::read_to_string(&self.path)?;
        let pattern = RegexBuilder::new(pattern).multi_line(true).build()?;
        Ok(pattern.is_match(&content))
    }

    /// The operator explicitly turned authorization off
    pub fn authorization_disabled(&self) -> Result<bool> {
        self.contains(r"^\s*authorization: disabled")
    }

    /// The active `replSetName` equals `name`
    pub fn has_repl_set_name(&self, name: &str) -> Result<bool> {
        self.contains(&format!(r"^\s*replSetName: {}\s*$", regex::escape(name)))
    }
}

/// Default daemon config; optional settings are present but commented so
/// they can be switched on by substitution.
pub fn render_default(paths: &PathsConfig, defaults: &DefaultsConfig, port: u16) -> String {
    let system_log = if defaults.disable_system_log {
        String::new()
    } else {
        format!("  destination: file\n  path: {}\n", paths.log_file().display())
    };

    format!(
        r#"# mongod.conf
# for documentation of all options, see:
#   http://docs.mongodb.org/manual/reference/configuration-options/

# where to write logging data.
systemLog:
{system_log}  quiet: false
  logAppend: true
  logRotate: reopen
  verbosity: 0

# Where and how to store data.
storage:
  dbPath: {db_dir}
  journal:
    enabled: true
  directoryPerDB: {directory_per_db}

# network interfaces
net:
  port: {port}
  unixDomainSocket:
    enabled: true
    pathPrefix: {tmp_dir}
  ipv6: {ipv6}
  bindIpAll: true

# replica set options
#replication:
  #replSetName: replicaset
  #enableMajorityReadConcern: true

# process management options
processManagement:
  fork: false
  pidFilePath: {pid_file}

# set parameter options
setParameter:
  enableLocalhostAuthBypass: true

# security options
security:
  #authorization: enabled
  #keyFile: replace_me
"#,
        system_log = system_log,
        db_dir = paths.db_dir().display(),
        directory_per_db = defaults.enable_directory_per_db,
        port = port,
        tmp_dir = paths.tmp_dir.display(),
        ipv6 = defaults.enable_ipv6,
        pid_file = paths.pid_file().display(),
    )
}
