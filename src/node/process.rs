//! mongod process control

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

use super::NodeService;
use crate::error::{Error, Result};
use crate::poller::{retry_while, Outcome, PollPolicy};

/// Drives the `mongod` binary with the provisioned config file
pub struct MongodProcess {
    /// Path to the daemon binary
    daemon: PathBuf,
    /// Config file passed with `--config`
    conf_file: PathBuf,
    /// Port probed by `wait_until_ready`
    port: u16,
    /// How long `wait_until_ready` keeps probing
    ready_timeout: Duration,
}

impl MongodProcess {
    pub fn new(bin_dir: &std::path::Path, conf_file: PathBuf, port: u16) -> Self {
        Self {
            daemon: bin_dir.join("mongod"),
            conf_file,
            port,
            ready_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    async fn run_daemon(&self, extra: &[&str]) -> Result<()> {
        let output = Command::new(&self.daemon)
            .arg("--config")
            .arg(&self.conf_file)
            .args(extra)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::execution(
                &format!("mongod {}", extra.join(" ")),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeService for MongodProcess {
    async fn start(&self) -> Result<()> {
        tracing::info!("Starting mongod on port {}", self.port);
        self.run_daemon(&["--fork"]).await?;
        self.wait_until_ready().await
    }

    async fn stop(&self) -> Result<()> {
        tracing::info!("Stopping mongod");
        self.run_daemon(&["--shutdown"]).await
    }

    async fn wait_until_ready(&self) -> Result<()> {
        wait_for_port("127.0.0.1", self.port, self.ready_timeout).await
    }
}

/// Poll every second until `host:port` accepts a TCP connection
pub async fn wait_for_port(host: &str, port: u16, limit: Duration) -> Result<()> {
    let address = format!("{}:{}", host, port);
    tracing::debug!("Waiting for {} to accept connections", address);

    let target = address.as_str();
    let ready = retry_while(&PollPolicy::per_second(limit), move || async move {
        match timeout(Duration::from_secs(1), TcpStream::connect(target)).await {
            Ok(Ok(_)) => Outcome::Satisfied,
            _ => Outcome::Pending,
        }
    })
    .await?;

    if !ready {
        return Err(Error::RetryExhausted {
            operation: format!("{} to accept connections", address),
        });
    }
    Ok(())
}
