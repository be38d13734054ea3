//! Node Lifecycle Module
//!
//! Starting and stopping the local database daemon.

mod process;

pub use process::{wait_for_port, MongodProcess};

use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle of the local database daemon
#[async_trait]
pub trait NodeService: Send + Sync {
    /// Start the daemon and return once it accepts connections
    async fn start(&self) -> Result<()>;

    /// Stop the daemon
    async fn stop(&self) -> Result<()>;

    /// Stop then start, picking up config file changes
    async fn restart(&self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    /// Block until the service port accepts connections
    async fn wait_until_ready(&self) -> Result<()>;
}
