// file: src/host/facts.rs
// version: 1.0.0
// guid: 0d7a3e5b-2f61-4c8e-b9a4-71e6c03d5f28

//! Facts about the local host and the user who invoked the tool

use super::CommandExecutor;
use crate::Result;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use sysinfo::System;
use tracing::debug;

/// Interface name prefixes that never carry the node address
const VIRTUAL_PREFIXES: [&str; 7] = ["lo", "cilium", "lxc", "docker", "veth", "cni", "flannel"];

/// Check if running as root
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Hostname of this machine
pub fn hostname() -> Result<String> {
    System::host_name()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| crate::error::ProvisionError::system("Unable to determine hostname"))
}

/// Primary non-loopback IPv4 address
pub fn primary_ipv4() -> Result<Ipv4Addr> {
    let interfaces = NetworkInterface::show().map_err(|e| {
        crate::error::ProvisionError::system(format!("Failed to list network interfaces: {}", e))
    })?;

    let candidates: Vec<(String, Ipv4Addr)> = interfaces
        .iter()
        .flat_map(|iface| {
            iface.addr.iter().filter_map(move |addr| match addr {
                Addr::V4(v4) => Some((iface.name.clone(), v4.ip)),
                Addr::V6(_) => None,
            })
        })
        .collect();

    debug!("IPv4 candidates: {:?}", candidates);
    select_primary_ipv4(&candidates).ok_or_else(|| {
        crate::error::ProvisionError::system("No non-loopback IPv4 address found on this host")
    })
}

/// Pick the first address that belongs to a physical-looking interface
pub fn select_primary_ipv4(candidates: &[(String, Ipv4Addr)]) -> Option<Ipv4Addr> {
    candidates
        .iter()
        .filter(|(name, ip)| {
            !ip.is_loopback()
                && !ip.is_link_local()
                && !ip.is_unspecified()
                && !VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
        })
        .map(|(_, ip)| *ip)
        .next()
}

/// The human account behind this run, `SUDO_USER` when elevated through sudo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokingUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

impl InvokingUser {
    /// Resolve the invoking user through `getent passwd`
    pub async fn detect<E: CommandExecutor>(executor: &mut E) -> Result<Self> {
        let name = std::env::var("SUDO_USER")
            .ok()
            .filter(|u| !u.is_empty())
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string());

        let line = executor
            .execute_with_output(&format!("getent passwd {}", name))
            .await?;

        Self::from_passwd_line(line.trim()).ok_or_else(|| {
            crate::error::ProvisionError::system(format!(
                "Could not parse passwd entry for user {}",
                name
            ))
        })
    }

    /// Parse one `name:x:uid:gid:gecos:home:shell` record
    pub fn from_passwd_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 7 {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
            shell: fields[6].to_string(),
        })
    }

    /// `~/.kube/config` of this user
    pub fn kubeconfig(&self) -> PathBuf {
        self.home.join(".kube").join("config")
    }
}
