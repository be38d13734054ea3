//! Replica Set Module
//!
//! Target topology types and the per-role convergence procedures.

mod configurator;
mod identity;

pub use configurator::{
    wait_until_sync_complete, JoinState, PrimaryState, PrimaryTarget, RoleConfigurator, PRIMARY_PRIORITY,
};
pub use identity::{machine_ip, NodeIdentity};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Role a node is driven into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaSetMode {
    /// Initiates a single-member set and becomes primary
    Primary,
    /// Joins the set through the primary as a data-bearing member
    Secondary,
    /// Joins the set through the primary as a voting-only member
    Arbiter,
    /// Membership is managed externally
    Dynamic,
}

impl ReplicaSetMode {
    /// Secondary and arbiter join through an existing primary
    pub fn joins_primary(&self) -> bool {
        matches!(self, ReplicaSetMode::Secondary | ReplicaSetMode::Arbiter)
    }
}

impl std::fmt::Display for ReplicaSetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicaSetMode::Primary => write!(f, "primary"),
            ReplicaSetMode::Secondary => write!(f, "secondary"),
            ReplicaSetMode::Arbiter => write!(f, "arbiter"),
            ReplicaSetMode::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl std::str::FromStr for ReplicaSetMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(ReplicaSetMode::Primary),
            "secondary" => Ok(ReplicaSetMode::Secondary),
            "arbiter" => Ok(ReplicaSetMode::Arbiter),
            "dynamic" => Ok(ReplicaSetMode::Dynamic),
            other => Err(Error::Config(format!(
                "Invalid replica set mode '{}'. Available options are 'primary/secondary/arbiter/dynamic'",
                other
            ))),
        }
    }
}

/// Declared target topology for this instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSetSpec {
    pub name: String,
    pub mode: ReplicaSetMode,
    pub enable_majority_read_concern: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Secondary".parse::<ReplicaSetMode>().unwrap(), ReplicaSetMode::Secondary);
        assert_eq!("dynamic".parse::<ReplicaSetMode>().unwrap(), ReplicaSetMode::Dynamic);
        assert!("leader".parse::<ReplicaSetMode>().is_err());
    }

    #[test]
    fn test_joining_roles() {
        assert!(ReplicaSetMode::Secondary.joins_primary());
        assert!(ReplicaSetMode::Arbiter.joins_primary());
        assert!(!ReplicaSetMode::Primary.joins_primary());
        assert!(!ReplicaSetMode::Dynamic.joins_primary());
    }
}
