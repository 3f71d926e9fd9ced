// file: src/config/mod.rs
// version: 2.0.0
// guid: a1b2c3d4-e5f6-7a8b-9c0d-1e2f3a4b5c6d

//! Configuration module for the Kubernetes node provisioner
//!
//! Holds the values threaded through the provisioning pipeline (host profile,
//! resolved versions, cluster endpoint) and the tunable settings loaded from
//! an optional YAML file.

pub mod cluster;
pub mod host;
pub mod loader;
pub mod settings;

pub use cluster::{parse_control_plane_address, ClusterEndpoint, HostRegistrationEntry, VersionSet};
pub use host::{HostProfile, OsFamily};
pub use settings::{FallbackVersions, HostPaths, ProvisionConfig};

use serde::{Deserialize, Serialize};

/// CPU architectures the runtime and CNI downloads exist for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "arm")]
    Arm,
}

impl Architecture {
    /// Get the architecture as used in release artifact names
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
            Architecture::Arm => "arm",
        }
    }

    /// Architecture of the running binary
    pub fn detect() -> crate::Result<Self> {
        std::env::consts::ARCH.parse()
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Architecture {
    type Err = crate::error::ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64" | "x86_64" => Ok(Architecture::Amd64),
            "arm64" | "aarch64" => Ok(Architecture::Arm64),
            "arm" | "armv7l" | "armhf" => Ok(Architecture::Arm),
            _ => Err(crate::error::ProvisionError::validation(format!(
                "Unsupported architecture: {}",
                s
            ))),
        }
    }
}
