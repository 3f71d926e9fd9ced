// file: src/config/host.rs
// version: 1.0.0
// guid: 3f1c9a52-7d4e-4b0a-9e6f-2c8d51a7b403

//! Host facts gathered once at startup

use super::Architecture;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Distribution family of the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OsFamily {
    Ubuntu,
    Debian,
    Other(String),
}

impl OsFamily {
    /// Map an os-release `ID` value onto a family
    pub fn from_id(id: &str) -> Self {
        match id.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "ubuntu" => OsFamily::Ubuntu,
            "debian" => OsFamily::Debian,
            other => OsFamily::Other(other.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, OsFamily::Ubuntu | OsFamily::Debian)
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Ubuntu => f.write_str("ubuntu"),
            OsFamily::Debian => f.write_str("debian"),
            OsFamily::Other(name) => write!(f, "{} (unsupported)", name),
        }
    }
}

/// Resources and platform of the machine being provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProfile {
    pub cpu_count: usize,
    pub ram_bytes: u64,
    pub os_family: OsFamily,
    pub architecture: Architecture,
}

impl HostProfile {
    /// Inspect the running host
    pub fn detect() -> crate::Result<Self> {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        Ok(Self {
            cpu_count: sys.cpus().len(),
            ram_bytes: sys.total_memory(),
            os_family: OsFamily::from_id(&System::distribution_id()),
            architecture: Architecture::detect()?,
        })
    }

    /// RAM in GiB, for display
    pub fn ram_gib(&self) -> f64 {
        self.ram_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}
