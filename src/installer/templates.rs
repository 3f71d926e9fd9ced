// file: src/installer/templates.rs
// version: 1.0.0
// guid: 3e8b6f14-a0c7-4d29-b571-c4f92d08e6a3

//! File contents and artifact locations the installer writes or fetches

use crate::config::Architecture;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Kernel modules loaded at boot for the container runtime and bridge netfilter
pub const MODULES_CONF: &str = "overlay\nbr_netfilter\n";

/// Bridged pod traffic through iptables and IPv4 forwarding
pub const SYSCTL_CONF: &str = "net.bridge.bridge-nf-call-iptables  = 1\n\
net.bridge.bridge-nf-call-ip6tables = 1\n\
net.ipv4.ip_forward                 = 1\n";

/// systemd unit published alongside the containerd sources
pub const CONTAINERD_UNIT_URL: &str =
    "https://raw.githubusercontent.com/containerd/containerd/main/containerd.service";

pub fn containerd_tarball(version: &str, arch: Architecture) -> String {
    format!("containerd-{}-linux-{}.tar.gz", version, arch.as_str())
}

pub fn containerd_url(version: &str, arch: Architecture) -> String {
    format!(
        "https://github.com/containerd/containerd/releases/download/v{}/{}",
        version,
        containerd_tarball(version, arch)
    )
}

/// runc publishes 32-bit ARM as `armhf`
pub fn runc_asset(arch: Architecture) -> String {
    match arch {
        Architecture::Arm => "runc.armhf".to_string(),
        other => format!("runc.{}", other.as_str()),
    }
}

pub fn runc_url(version: &str, arch: Architecture) -> String {
    format!(
        "https://github.com/opencontainers/runc/releases/download/v{}/{}",
        version,
        runc_asset(arch)
    )
}

/// `pkgs.k8s.io` repository root for one minor release line
pub fn k8s_repo_url(major: u64, minor: u64) -> String {
    format!("https://pkgs.k8s.io/core:/stable:/v{}.{}/deb/", major, minor)
}

pub fn apt_source_line(major: u64, minor: u64, keyring: &Path) -> String {
    format!(
        "deb [signed-by={}] {} /\n",
        keyring.display(),
        k8s_repo_url(major, minor)
    )
}

fn swap_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*[^#\s]\S*\s+\S+\s+swap\s").expect("static regex"))
}

/// Comment out active swap entries in an fstab; returns whether anything changed
pub fn comment_out_swap(fstab: &str) -> (String, bool) {
    let mut changed = false;
    let mut out: Vec<String> = Vec::new();
    for line in fstab.lines() {
        if swap_line().is_match(&format!("{} ", line)) {
            out.push(format!("#{}", line));
            changed = true;
        } else {
            out.push(line.to_string());
        }
    }
    let mut joined = out.join("\n");
    if fstab.ends_with('\n') {
        joined.push('\n');
    }
    (joined, changed)
}

fn systemd_cgroup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(\s*)SystemdCgroup\s*=\s*\w+").expect("static regex"))
}

fn sandbox_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^(\s*)(sandbox_image|sandbox)\s*=\s*["'][^"']*["']"#).expect("static regex")
    })
}

/// Patch `containerd config default` output in place
///
/// Only the cgroup driver flag and the sandbox image are touched. Returns
/// `None` when either key is missing from the generated config.
pub fn patch_containerd_config(config: &str, sandbox_image: &str) -> Option<String> {
    if !systemd_cgroup().is_match(config) || !sandbox_key().is_match(config) {
        return None;
    }
    let patched = systemd_cgroup().replace_all(config, "${1}SystemdCgroup = true");
    let replacement = format!("${{1}}${{2}} = \"{}\"", sandbox_image);
    Some(sandbox_key().replace_all(&patched, replacement.as_str()).into_owned())
}
