//! Shell Client
//!
//! Delivers administrative commands by running the database shell with
//! `--eval` against the target endpoint.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ClusterClient, CommandOutput, ConnectionProperties, LegacyTextProtocol};
use crate::error::{Error, Result};

/// Cluster client backed by the `mongo` shell binary
pub struct ShellClient {
    /// Path to the shell binary
    shell: PathBuf,
    /// Upper bound for a single command
    command_timeout: Duration,
}

impl ShellClient {
    /// Create a client using `<bin_dir>/mongo`
    pub fn new(bin_dir: &std::path::Path) -> Self {
        Self {
            shell: bin_dir.join("mongo"),
            command_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Shell arguments for `command` against `connection`
    fn args(command: &str, connection: &ConnectionProperties) -> Vec<String> {
        let mut args = vec![
            "--quiet".to_string(),
            "--host".to_string(),
            connection.host.clone(),
            "--port".to_string(),
            connection.port.to_string(),
        ];

        // The legacy shell only takes the password as an argument, so it is
        // visible in the process list while the command runs.
        if let Some(user) = &connection.user {
            args.push("--username".to_string());
            args.push(user.clone());
            if let Some(password) = &connection.password {
                args.push("--password".to_string());
                args.push(password.clone());
            }
            args.push("--authenticationDatabase".to_string());
            args.push("admin".to_string());
        }

        args.push(connection.database.clone());
        args.push("--eval".to_string());
        args.push(command.to_string());
        args
    }

    async fn run(&self, command: &str, connection: &ConnectionProperties) -> Result<CommandOutput> {
        let child = Command::new(&self.shell)
            .args(Self::args(command, connection))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.command_timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::execution(command, e)),
            Err(_) => {
                return Err(Error::execution(
                    command,
                    format!("no answer from {} within {:?}", connection.address(), self.command_timeout),
                ))
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[async_trait]
impl ClusterClient for ShellClient {
    async fn execute(&self, command: &str, connection: &ConnectionProperties) -> Result<CommandOutput> {
        tracing::trace!("Executing '{}' against {}", command, connection.address());
        let output = self.run(command, connection).await?;

        if output.exit_code != 0 {
            let reason = if output.stderr.is_empty() { &output.stdout } else { &output.stderr };
            return Err(Error::execution(
                command,
                format!("exit code {}: {}", output.exit_code, reason),
            ));
        }

        Ok(output)
    }

    async fn check_connection(&self, connection: &ConnectionProperties) -> Result<()> {
        let connectivity = |reason: String| Error::Connectivity {
            host: connection.host.clone(),
            port: connection.port,
            reason,
        };

        let output = self
            .execute(LegacyTextProtocol::PING, connection)
            .await
            .map_err(|e| connectivity(e.to_string()))?;

        if !LegacyTextProtocol::is_ok(&output.stdout) {
            return Err(connectivity(format!("unexpected ping reply: {}", output.stdout)));
        }

        Ok(())
    }
}
