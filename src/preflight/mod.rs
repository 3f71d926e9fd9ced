// file: src/preflight/mod.rs
// version: 1.0.0
// guid: 6d1f0b83-2a9e-4c75-91e4-b3c8a07d5f12

//! Host suitability checks run before anything is changed

use crate::config::{Architecture, HostProfile};
use crate::Result;
use serde::Serialize;
use tracing::{info, warn};

/// Minimum logical CPUs kubeadm accepts for a control plane
pub const MIN_CPU_COUNT: usize = 2;

/// Minimum memory, 2 GiB
pub const MIN_RAM_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// One line of the `check-prereqs` output
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Fail if the host is below the CPU or memory floor
pub fn validate(profile: &HostProfile) -> Result<()> {
    if profile.cpu_count < MIN_CPU_COUNT {
        return Err(crate::error::ProvisionError::preflight(format!(
            "{} CPU(s) detected, at least {} required",
            profile.cpu_count, MIN_CPU_COUNT
        )));
    }
    if profile.ram_bytes < MIN_RAM_BYTES {
        return Err(crate::error::ProvisionError::preflight(format!(
            "{:.2} GiB of memory detected ({} bytes), at least {} GiB required",
            profile.ram_gib(),
            profile.ram_bytes,
            MIN_RAM_BYTES / (1024 * 1024 * 1024)
        )));
    }
    info!(
        "Host has {} CPUs and {:.1} GiB of memory",
        profile.cpu_count,
        profile.ram_gib()
    );
    Ok(())
}

/// Fail unless running with an effective uid of 0
pub fn require_root() -> Result<()> {
    if crate::host::facts::is_root() {
        Ok(())
    } else {
        Err(crate::error::ProvisionError::preflight(
            "must run as root (try sudo)",
        ))
    }
}

/// Warn when the distribution is not one the apt repositories target
pub fn check_os(profile: &HostProfile) -> bool {
    if profile.os_family.is_supported() {
        true
    } else {
        warn!(
            "Untested distribution '{}'; Ubuntu or Debian is expected",
            profile.os_family
        );
        false
    }
}

/// All three architectures have runtime and CNI release artifacts
pub fn check_architecture(arch: Architecture) -> bool {
    matches!(arch, Architecture::Amd64 | Architecture::Arm64 | Architecture::Arm)
}

/// Run every check without failing, for the `check-prereqs` report
pub fn report(profile: &HostProfile, is_root: bool) -> Vec<CheckResult> {
    vec![
        CheckResult {
            name: "cpu",
            passed: profile.cpu_count >= MIN_CPU_COUNT,
            detail: format!("{} (minimum {})", profile.cpu_count, MIN_CPU_COUNT),
        },
        CheckResult {
            name: "memory",
            passed: profile.ram_bytes >= MIN_RAM_BYTES,
            detail: format!("{:.2} GiB (minimum 2 GiB)", profile.ram_gib()),
        },
        CheckResult {
            name: "os",
            passed: profile.os_family.is_supported(),
            detail: profile.os_family.to_string(),
        },
        CheckResult {
            name: "architecture",
            passed: check_architecture(profile.architecture),
            detail: profile.architecture.to_string(),
        },
        CheckResult {
            name: "root",
            passed: is_root,
            detail: if is_root { "yes" } else { "no" }.to_string(),
        },
    ]
}
