// file: src/config/settings.rs
// version: 1.0.0
// guid: c5d0e8a3-94b7-4e12-8f3c-6a0b7d25e918

//! Tunable provisioning settings
//!
//! Every field has a default, so a config file only needs the keys it
//! overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::{Validate, ValidationError};

/// Settings for one provisioning or teardown run
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Kubernetes API server port
    #[validate(range(min = 1))]
    pub api_port: u16,

    /// Name both nodes use to reach the control plane
    #[validate(length(min = 1, max = 63))]
    pub control_plane_alias: String,

    /// Pod network CIDR handed to kubeadm
    #[validate(custom(function = "validate_cidr"))]
    pub pod_subnet: String,

    /// Seconds to wait after killing the API port holder before re-checking
    #[validate(range(min = 1, max = 60))]
    pub port_grace_secs: u64,

    /// Duration passed to `cilium status --wait-duration`
    #[validate(length(min = 1))]
    pub cilium_wait: String,

    /// Duration passed to `cilium uninstall --timeout`
    #[validate(length(min = 1))]
    pub cilium_uninstall_timeout: String,

    /// Journal lines shown when a service fails to start
    #[validate(range(min = 1, max = 1000))]
    pub journal_lines: u32,

    /// Skip remote version lookups and use the static fallbacks
    pub offline: bool,

    #[validate(nested)]
    pub fallback: FallbackVersions,

    pub paths: HostPaths,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            api_port: 6443,
            control_plane_alias: "k8scp".to_string(),
            pod_subnet: "10.200.0.0/16".to_string(),
            port_grace_secs: 2,
            cilium_wait: "5m".to_string(),
            cilium_uninstall_timeout: "2m".to_string(),
            journal_lines: 25,
            offline: false,
            fallback: FallbackVersions::default(),
            paths: HostPaths::default(),
        }
    }
}

/// Static versions used when remote lookups fail
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FallbackVersions {
    #[validate(length(min = 1))]
    pub containerd: String,
    #[validate(length(min = 1))]
    pub runc: String,
    #[validate(length(min = 1))]
    pub kubernetes: String,
    #[validate(length(min = 1))]
    pub cilium: String,
    #[validate(length(min = 1))]
    pub cilium_cli: String,
}

impl Default for FallbackVersions {
    fn default() -> Self {
        Self {
            containerd: "1.7.22".to_string(),
            runc: "1.1.14".to_string(),
            kubernetes: "1.31.1".to_string(),
            cilium: "1.16.2".to_string(),
            cilium_cli: "0.16.19".to_string(),
        }
    }
}

/// Host filesystem locations the installer writes and the reconciler removes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPaths {
    pub hosts_file: PathBuf,
    pub fstab: PathBuf,
    pub kubeadm_config: PathBuf,
    pub init_log: PathBuf,
    pub sysctl_file: PathBuf,
    pub modules_file: PathBuf,
    pub apt_list: PathBuf,
    pub apt_keyring: PathBuf,
    pub containerd_config: PathBuf,
    pub containerd_unit: PathBuf,
    pub admin_kubeconfig: PathBuf,
    pub cni_conf_dir: PathBuf,
    pub binaries: Vec<PathBuf>,
    pub state_dirs: Vec<PathBuf>,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            hosts_file: PathBuf::from("/etc/hosts"),
            fstab: PathBuf::from("/etc/fstab"),
            kubeadm_config: PathBuf::from("kubeadm-config.yaml"),
            init_log: PathBuf::from("kubeadm-init.out"),
            sysctl_file: PathBuf::from("/etc/sysctl.d/k8s.conf"),
            modules_file: PathBuf::from("/etc/modules-load.d/k8s.conf"),
            apt_list: PathBuf::from("/etc/apt/sources.list.d/kubernetes.list"),
            apt_keyring: PathBuf::from("/etc/apt/keyrings/kubernetes-apt-keyring.gpg"),
            containerd_config: PathBuf::from("/etc/containerd/config.toml"),
            containerd_unit: PathBuf::from("/usr/local/lib/systemd/system/containerd.service"),
            admin_kubeconfig: PathBuf::from("/etc/kubernetes/admin.conf"),
            cni_conf_dir: PathBuf::from("/etc/cni/net.d"),
            binaries: [
                "/usr/local/bin/containerd",
                "/usr/local/bin/containerd-shim-runc-v2",
                "/usr/local/bin/containerd-stress",
                "/usr/local/bin/ctr",
                "/usr/local/sbin/runc",
                "/usr/local/bin/cilium",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
            state_dirs: [
                "/etc/cni/net.d",
                "/var/lib/cni",
                "/opt/cni/bin",
                "/var/lib/containerd",
                "/etc/containerd",
                "/run/containerd",
                "/etc/kubernetes",
                "/var/lib/kubelet",
                "/var/lib/etcd",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
        }
    }
}

impl ProvisionConfig {
    /// Run the derived validation rules and map them onto the crate error
    pub fn check(&self) -> crate::Result<()> {
        self.validate()
            .map_err(|e| crate::error::ProvisionError::config(format!("Invalid settings: {}", e)))
    }
}

fn validate_cidr(cidr: &str) -> Result<(), ValidationError> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| ValidationError::new("cidr_missing_prefix"))?;
    addr.parse::<std::net::Ipv4Addr>()
        .map_err(|_| ValidationError::new("cidr_bad_address"))?;
    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        _ => Err(ValidationError::new("cidr_bad_prefix")),
    }
}
