//! Cluster Client Module
//!
//! Issues administrative commands to a node's control endpoint.

mod protocol;
mod shell;

pub use protocol::LegacyTextProtocol;
pub use shell::ShellClient;

use async_trait::async_trait;

use crate::error::Result;

/// Where and as whom an administrative command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProperties {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ConnectionProperties {
    /// Unauthenticated connection to the local node
    pub fn local(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            database: "admin".to_string(),
            user: None,
            password: None,
        }
    }

    /// Authenticate as `user`; without a password the connection stays anonymous
    pub fn with_credentials(mut self, user: &str, password: Option<&str>) -> Self {
        match password.filter(|p| !p.is_empty()) {
            Some(password) => {
                self.user = Some(user.to_string());
                self.password = Some(password.to_string());
            }
            None => {
                self.user = None;
                self.password = None;
            }
        }
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// `host:port` of the endpoint
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Captured output of a delivered command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }
}

/// Administrative command channel to a cluster member
///
/// `execute` fails with `Error::Execution` when the command cannot be
/// delivered; a command that runs but reports a logical failure is returned
/// as a value for the caller to inspect.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Send `command` to the node behind `connection`
    async fn execute(&self, command: &str, connection: &ConnectionProperties) -> Result<CommandOutput>;

    /// Fail with `Error::Connectivity` if the endpoint rejects the credentials
    /// or cannot be reached
    async fn check_connection(&self, connection: &ConnectionProperties) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_without_password_stay_anonymous() {
        let conn = ConnectionProperties::local(27017).with_credentials("root", Some(""));
        assert!(conn.user.is_none());
        assert!(conn.password.is_none());
        assert_eq!(conn.address(), "127.0.0.1:27017");

        let conn = ConnectionProperties::local(27017).with_credentials("root", None);
        assert_eq!(conn, ConnectionProperties::local(27017));
    }

    #[test]
    fn test_credentials_with_password() {
        let conn = ConnectionProperties::local(27017).with_credentials("root", Some("pw"));
        assert_eq!(conn.user.as_deref(), Some("root"));
        assert_eq!(conn.password.as_deref(), Some("pw"));
    }
}
