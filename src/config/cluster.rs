// file: src/config/cluster.rs
// version: 1.0.0
// guid: 8b2e4d71-0c3a-4f95-a6d8-5e17c93b2f60

//! Cluster-level values: resolved versions, endpoint and host registrations

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::OnceLock;

/// Versions every later step installs against
///
/// Versions are stored without a leading `v`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSet {
    /// containerd
    pub runtime_version: String,
    /// runc
    pub shim_version: String,
    /// Kubernetes
    pub orchestrator_version: String,
    /// Cilium, as installed into the cluster
    pub networking_plugin_version: String,
    /// cilium-cli binary
    pub networking_cli_version: String,
    /// registry.k8s.io/pause tag
    pub sandbox_image_version: String,
}

impl VersionSet {
    /// Full sandbox image reference for the runtime configuration
    pub fn sandbox_image(&self) -> String {
        format!("registry.k8s.io/pause:{}", self.sandbox_image_version)
    }

    /// Names of fields that are still empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let fields = [
            ("runtime_version", &self.runtime_version),
            ("shim_version", &self.shim_version),
            ("orchestrator_version", &self.orchestrator_version),
            ("networking_plugin_version", &self.networking_plugin_version),
            ("networking_cli_version", &self.networking_cli_version),
            ("sandbox_image_version", &self.sandbox_image_version),
        ];
        fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Where the control plane lives and how the cluster is shaped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    pub control_plane_address: Ipv4Addr,
    pub control_plane_hostname: String,
    pub pod_subnet_cidr: String,
    /// kubeadm configuration schema, e.g. `v1beta4`
    pub api_version_tag: String,
}

impl ClusterEndpoint {
    /// `host:port` form used as kubeadm's controlPlaneEndpoint
    pub fn endpoint_with_port(&self, alias: &str, port: u16) -> String {
        format!("{}:{}", alias, port)
    }
}

/// One `/etc/hosts` mapping managed by the provisioner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRegistrationEntry {
    pub ip_address: String,
    pub name: String,
}

impl HostRegistrationEntry {
    pub fn new(ip_address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            name: name.into(),
        }
    }

    /// Rendered hosts-file line
    pub fn to_line(&self) -> String {
        format!("{} {}", self.ip_address, self.name)
    }
}

fn dotted_quad() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("static regex")
    })
}

/// Validate a control-plane address supplied by the operator
///
/// Accepts exactly four decimal octets in 0-255. No trimming beyond
/// surrounding whitespace, no hostname lookup.
pub fn parse_control_plane_address(input: &str) -> crate::Result<Ipv4Addr> {
    let candidate = input.trim();
    let caps = dotted_quad().captures(candidate).ok_or_else(|| {
        crate::error::ProvisionError::validation(format!(
            "Invalid control-plane address '{}': expected an IPv4 dotted quad such as 10.0.0.5",
            input
        ))
    })?;

    let mut octets = [0u8; 4];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = caps[i + 1].parse::<u8>().map_err(|_| {
            crate::error::ProvisionError::validation(format!(
                "Invalid control-plane address '{}': octet '{}' is out of range 0-255",
                input,
                &caps[i + 1]
            ))
        })?;
    }

    Ok(Ipv4Addr::from(octets))
}
