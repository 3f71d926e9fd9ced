// file: src/error.rs
// version: 3.0.0
// guid: 57b83a63-07b6-4534-aa6c-51e8797254e0

use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Error types for the Kubernetes node provisioner
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Preflight check failed: {0}")]
    Preflight(String),

    #[error("Command '{command}' failed with exit code {exit_code:?}: {stderr}")]
    Process {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Step '{step}' failed: {reason}")]
    Step { step: String, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Version resolution error: {0}")]
    Resolution(#[from] crate::versions::ResolutionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("System error: {0}")]
    System(String),
}

impl ProvisionError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new preflight error
    pub fn preflight(msg: impl Into<String>) -> Self {
        Self::Preflight(msg.into())
    }

    /// Create a new step failure
    pub fn step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new system error
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Create a new cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_error_names_command_and_code() {
        let err = ProvisionError::Process {
            command: "systemctl is-active containerd".to_string(),
            exit_code: Some(3),
            stderr: "inactive".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("systemctl is-active containerd"));
        assert!(msg.contains("Some(3)"));
        assert!(msg.contains("inactive"));
    }

    #[test]
    fn test_checksum_error_shows_both_digests() {
        let err = ProvisionError::ChecksumMismatch {
            file: "cilium-linux-amd64.tar.gz".to_string(),
            expected: "aaa".to_string(),
            actual: "bbb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected aaa"));
        assert!(msg.contains("got bbb"));
    }

    #[test]
    fn test_constructor_helpers() {
        assert!(matches!(ProvisionError::validation("x"), ProvisionError::Validation(_)));
        assert!(matches!(ProvisionError::preflight("x"), ProvisionError::Preflight(_)));
        assert!(matches!(ProvisionError::cancelled("x"), ProvisionError::Cancelled(_)));
        assert!(matches!(
            ProvisionError::step("swap", "busy"),
            ProvisionError::Step { .. }
        ));
    }
}
