//! rsprovision - MongoDB Replica Set Provisioner
//!
//! Brings a single database instance from whatever state it finds on disk to
//! its declared role in a replica set, idempotently, on every boot.
//!
//! # Architecture
//!
//! The orchestrator decides once, from the persistent volume, whether the
//! instance is deployed from scratch or restarted on persisted data. Fresh
//! deployments start the daemon, create users and drive the node into its
//! role through the role configurator. Every remote wait goes through the
//! bounded poller.
//!
//! # Roles
//!
//! - `primary` initiates a single-member set
//! - `secondary` and `arbiter` join through an existing primary
//! - `dynamic` leaves membership to an external controller

pub mod client;
pub mod conf_file;
pub mod config;
pub mod error;
pub mod fsperm;
pub mod keyfile;
pub mod node;
pub mod orchestrator;
pub mod poller;
pub mod replset;
pub mod summary;
pub mod supervisor;
pub mod volume;

#[cfg(test)]
mod testing;

pub use config::ProvisionConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{ClusterClient, ConnectionProperties, ShellClient};
    pub use crate::config::ProvisionConfig;
    pub use crate::error::{Error, Result};
    pub use crate::node::{MongodProcess, NodeService};
    pub use crate::orchestrator::{Orchestrator, RunContext};
    pub use crate::poller::{retry_while, Outcome, PollPolicy};
    pub use crate::replset::{NodeIdentity, ReplicaSetMode, ReplicaSetSpec};
}
