//! rsprovision Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rsprovision operations
pub type Result<T> = std::result::Result<T, Error>;

/// rsprovision error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Unable to find a line for '{key}' in {path:?}")]
    ConfigSubstitution { key: String, path: PathBuf },

    /// Bad role/auth input combination, detected before any mutation
    #[error("{0}")]
    Validation(String),

    // Cluster control channel errors
    #[error("Unable to connect to {host}:{port}: {reason}")]
    Connectivity { host: String, port: u16, reason: String },

    #[error("Command '{command}' failed: {reason}")]
    Execution { command: String, reason: String },

    // Bounded poll exhaustion
    #[error("Timed out waiting for {operation}")]
    RetryExhausted { operation: String },

    #[error("Unable to validate {host} as primary node in the replica set scenario")]
    PrimaryUnreachable { host: String },

    #[error("Unable to confirm that {node} has been added to the replica set")]
    MembershipNotConfirmed { node: String },

    // Filesystem errors
    #[error("Unable to write {path:?}: {reason}")]
    Permission { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error is transient and should be treated as "still pending"
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Execution { .. })
    }

    /// Shorthand for an execution failure of `command`
    pub fn execution(command: &str, reason: impl std::fmt::Display) -> Self {
        Error::Execution {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_execution_errors_are_retryable() {
        assert!(Error::execution("rs.status()", "connection refused").is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
        assert!(!Error::PrimaryUnreachable { host: "db-0".into() }.is_retryable());
        assert!(!Error::Connectivity {
            host: "db-0".into(),
            port: 27017,
            reason: "auth failed".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_exhaustion_messages_name_the_target() {
        let err = Error::MembershipNotConfirmed { node: "10.0.0.7:27017".into() };
        assert!(err.to_string().contains("10.0.0.7:27017"));

        let err = Error::PrimaryUnreachable { host: "mongodb-primary".into() };
        assert!(err.to_string().contains("mongodb-primary"));
    }
}
