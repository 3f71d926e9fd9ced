// file: src/installer/mod.rs
// version: 2.0.0
// guid: g7h8i9j0-k1l2-3456-7890-abcdef123456

//! Container runtime and Kubernetes package installation
//!
//! Steps run in a fixed order and each one must succeed before the next
//! starts; the first failure is returned as a [`ProvisionError::Step`]
//! naming the step.
//!
//! [`ProvisionError::Step`]: crate::error::ProvisionError::Step

pub mod templates;

use crate::config::{Architecture, ProvisionConfig, VersionSet};
use crate::error::ProvisionError;
use crate::host::CommandExecutor;
use crate::network::Downloader;
use crate::versions::major_minor;
use crate::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

/// Where the containerd release tarball is unpacked
const INSTALL_PREFIX: &str = "/usr/local";

const BASE_PACKAGES: [&str; 4] = ["apt-transport-https", "ca-certificates", "curl", "gpg"];

const KUBE_PACKAGES: [&str; 3] = ["kubelet", "kubeadm", "kubectl"];

/// Installs containerd, runc and the pinned Kubernetes packages
pub struct ComponentInstaller<'a, E: CommandExecutor> {
    executor: &'a mut E,
    downloader: &'a dyn Downloader,
    config: &'a ProvisionConfig,
    arch: Architecture,
}

impl<'a, E: CommandExecutor> ComponentInstaller<'a, E> {
    pub fn new(
        executor: &'a mut E,
        downloader: &'a dyn Downloader,
        config: &'a ProvisionConfig,
        arch: Architecture,
    ) -> Self {
        Self {
            executor,
            downloader,
            config,
            arch,
        }
    }

    /// Run every install step in order
    pub async fn install(&mut self, versions: &VersionSet) -> Result<()> {
        let missing = versions.missing_fields();
        if !missing.is_empty() {
            return Err(ProvisionError::validation(format!(
                "version set incomplete: {}",
                missing.join(", ")
            )));
        }
        let (major, minor) = major_minor(&versions.orchestrator_version).ok_or_else(|| {
            crate::versions::ResolutionError::OrchestratorUnparseable(versions.orchestrator_version.clone())
        })?;

        let downloads = TempDir::new()?;
        info!("Installing components for Kubernetes {}", versions.orchestrator_version);

        self.disable_swap().await?;
        self.install_base_packages().await?;
        self.configure_kernel().await?;
        self.install_runtime(versions, downloads.path()).await?;
        self.start_runtime().await?;
        self.add_kubernetes_repository(major, minor).await?;
        self.install_kubernetes_packages(&versions.orchestrator_version).await?;

        info!("Component installation completed");
        Ok(())
    }

    async fn log_and_execute(&mut self, step: &str, command: &str) -> Result<()> {
        info!("{}", step);
        self.executor
            .execute(command)
            .await
            .map_err(|e| ProvisionError::step(step, e.to_string()))
    }

    async fn write_file(step: &str, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProvisionError::step(step, format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ProvisionError::step(step, format!("{}: {}", path.display(), e)))
    }

    async fn disable_swap(&mut self) -> Result<()> {
        self.log_and_execute("Disabling swap", "swapoff -a").await?;

        let config = self.config;
        let fstab = &config.paths.fstab;
        let content = match tokio::fs::read_to_string(fstab).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let (updated, changed) = templates::comment_out_swap(&content);
        if changed {
            Self::write_file("Disabling swap", fstab, &updated).await?;
            info!("Commented out swap entries in {}", fstab.display());
        }
        Ok(())
    }

    async fn install_base_packages(&mut self) -> Result<()> {
        self.log_and_execute("Updating package lists", "apt-get update").await?;
        let cmd = format!(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
            BASE_PACKAGES.join(" ")
        );
        self.log_and_execute("Installing base packages", &cmd).await
    }

    async fn ip_forward_enabled(&mut self) -> Result<bool> {
        let value = self
            .executor
            .execute_with_output("sysctl -n net.ipv4.ip_forward")
            .await?;
        Ok(value.trim() == "1")
    }

    async fn configure_kernel(&mut self) -> Result<()> {
        const STEP: &str = "Configuring kernel modules and parameters";
        let config = self.config;
        let paths = &config.paths;

        Self::write_file(STEP, &paths.modules_file, templates::MODULES_CONF).await?;
        self.log_and_execute("Loading overlay module", "modprobe overlay").await?;
        self.log_and_execute("Loading br_netfilter module", "modprobe br_netfilter").await?;

        Self::write_file(STEP, &paths.sysctl_file, templates::SYSCTL_CONF).await?;
        self.log_and_execute("Applying sysctl settings", "sysctl --system").await?;

        if self.ip_forward_enabled().await? {
            return Ok(());
        }
        warn!("net.ipv4.ip_forward is not active after sysctl --system, forcing it");
        self.log_and_execute("Forcing IPv4 forwarding", "sysctl -w net.ipv4.ip_forward=1")
            .await?;
        if self.ip_forward_enabled().await? {
            Ok(())
        } else {
            Err(ProvisionError::step(
                STEP,
                "net.ipv4.ip_forward is still 0 after sysctl -w",
            ))
        }
    }

    async fn fetch(&self, step: &str, url: &str, dest: &Path) -> Result<()> {
        info!("{}: {}", step, url);
        self.downloader
            .download(url, dest)
            .await
            .map_err(|e| ProvisionError::step(step, e.to_string()))
    }

    async fn install_runtime(&mut self, versions: &VersionSet, downloads: &Path) -> Result<()> {
        let tarball = downloads.join(templates::containerd_tarball(&versions.runtime_version, self.arch));
        self.fetch(
            "Downloading containerd",
            &templates::containerd_url(&versions.runtime_version, self.arch),
            &tarball,
        )
        .await?;
        self.log_and_execute(
            "Extracting containerd",
            &format!("tar Cxzf {} {}", INSTALL_PREFIX, tarball.display()),
        )
        .await?;

        let runc = downloads.join(templates::runc_asset(self.arch));
        self.fetch(
            "Downloading runc",
            &templates::runc_url(&versions.shim_version, self.arch),
            &runc,
        )
        .await?;
        self.log_and_execute(
            "Installing runc",
            &format!("install -m 755 {} {}/sbin/runc", runc.display(), INSTALL_PREFIX),
        )
        .await?;

        let unit = self.config.paths.containerd_unit.clone();
        if let Some(parent) = unit.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.fetch("Installing containerd unit", templates::CONTAINERD_UNIT_URL, &unit)
            .await?;

        self.write_runtime_config(&versions.sandbox_image()).await
    }

    async fn write_runtime_config(&mut self, sandbox_image: &str) -> Result<()> {
        const STEP: &str = "Generating containerd configuration";
        info!("{}", STEP);
        let default = self
            .executor
            .execute_with_output("containerd config default")
            .await
            .map_err(|e| ProvisionError::step(STEP, e.to_string()))?;

        let patched = templates::patch_containerd_config(&default, sandbox_image).ok_or_else(|| {
            ProvisionError::step(
                STEP,
                "default config lacks SystemdCgroup or the sandbox image key",
            )
        })?;
        let path: PathBuf = self.config.paths.containerd_config.clone();
        Self::write_file(STEP, &path, &patched).await?;
        debug!("Wrote {} with sandbox image {}", path.display(), sandbox_image);
        Ok(())
    }

    async fn start_runtime(&mut self) -> Result<()> {
        self.log_and_execute("Reloading systemd", "systemctl daemon-reload").await?;
        self.log_and_execute("Starting containerd", "systemctl enable --now containerd")
            .await?;

        if self
            .executor
            .check_silent("systemctl is-active --quiet containerd")
            .await?
        {
            info!("containerd is active");
            return Ok(());
        }

        let journal = self
            .executor
            .execute_with_output(&format!(
                "journalctl -u containerd -n {} --no-pager",
                self.config.journal_lines
            ))
            .await
            .unwrap_or_default();
        error!("containerd failed to start, recent journal:\n{}", journal.trim_end());
        Err(ProvisionError::step(
            "Starting containerd",
            format!("containerd is not active\n{}", journal.trim_end()),
        ))
    }

    async fn add_kubernetes_repository(&mut self, major: u64, minor: u64) -> Result<()> {
        const STEP: &str = "Adding Kubernetes apt repository";
        let keyring = self.config.paths.apt_keyring.clone();

        match tokio::fs::remove_file(&keyring).await {
            Ok(()) => debug!("Removed stale keyring {}", keyring.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ProvisionError::step(STEP, e.to_string())),
        }
        if let Some(parent) = keyring.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = format!(
            "curl -fsSL {}Release.key | gpg --dearmor -o {}",
            templates::k8s_repo_url(major, minor),
            keyring.display()
        );
        self.log_and_execute(STEP, &cmd).await?;

        let line = templates::apt_source_line(major, minor, &keyring);
        let config = self.config;
        Self::write_file(STEP, &config.paths.apt_list, &line).await
    }

    async fn install_kubernetes_packages(&mut self, version: &str) -> Result<()> {
        self.log_and_execute("Updating package lists", "apt-get update").await?;

        let pinned: Vec<String> = KUBE_PACKAGES
            .iter()
            .map(|p| format!("{}={}-*", p, version))
            .collect();
        let cmd = format!(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y --allow-change-held-packages {}",
            pinned.join(" ")
        );
        self.log_and_execute("Installing Kubernetes packages", &cmd).await?;
        self.log_and_execute(
            "Holding Kubernetes packages",
            &format!("apt-mark hold {}", KUBE_PACKAGES.join(" ")),
        )
        .await?;
        self.log_and_execute("Enabling kubelet", "systemctl enable --now kubelet")
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::host::executor::fake::FakeExecutor;
    use crate::network::fake::FakeDownloader;

    pub(crate) const CONTAINERD_DEFAULT: &str = "version = 2\n[plugins.\"io.containerd.grpc.v1.cri\"]\n  sandbox_image = \"registry.k8s.io/pause:3.8\"\n  SystemdCgroup = false\n";

    pub(crate) fn versions() -> VersionSet {
        VersionSet {
            runtime_version: "1.7.22".to_string(),
            shim_version: "1.1.14".to_string(),
            orchestrator_version: "1.31.1".to_string(),
            networking_plugin_version: "1.16.2".to_string(),
            networking_cli_version: "0.16.19".to_string(),
            sandbox_image_version: "3.10".to_string(),
        }
    }

    pub(crate) fn sandboxed_config(root: &Path) -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        config.port_grace_secs = 0;
        let at = |p: &str| root.join(p.trim_start_matches('/'));
        let paths = &mut config.paths;
        paths.cni_conf_dir = at("/etc/cni/net.d");
        paths.binaries = paths.binaries.iter().map(|b| at(&b.to_string_lossy())).collect();
        paths.state_dirs = paths.state_dirs.iter().map(|d| at(&d.to_string_lossy())).collect();
        paths.fstab = at("/etc/fstab");
        paths.hosts_file = at("/etc/hosts");
        paths.modules_file = at("/etc/modules-load.d/k8s.conf");
        paths.sysctl_file = at("/etc/sysctl.d/k8s.conf");
        paths.containerd_unit = at("/usr/local/lib/systemd/system/containerd.service");
        paths.containerd_config = at("/etc/containerd/config.toml");
        paths.apt_list = at("/etc/apt/sources.list.d/kubernetes.list");
        paths.apt_keyring = at("/etc/apt/keyrings/kubernetes-apt-keyring.gpg");
        paths.kubeadm_config = at("/work/kubeadm-config.yaml");
        paths.init_log = at("/work/kubeadm-init.out");
        paths.admin_kubeconfig = at("/etc/kubernetes/admin.conf");
        config
    }

    pub(crate) fn healthy_host() -> FakeExecutor {
        let mut exec = FakeExecutor::new();
        exec.respond("sysctl -n net.ipv4.ip_forward", 0, "1\n")
            .respond("containerd config default", 0, CONTAINERD_DEFAULT);
        exec
    }

    #[tokio::test]
    async fn test_install_runs_steps_in_order() {
        let root = tempfile::TempDir::new().unwrap();
        let config = sandboxed_config(root.path());
        tokio::fs::create_dir_all(root.path().join("etc")).await.unwrap();
        tokio::fs::write(&config.paths.fstab, "/swap.img none swap sw 0 0\n")
            .await
            .unwrap();
        tokio::fs::create_dir_all(config.paths.apt_keyring.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&config.paths.apt_keyring, "stale").await.unwrap();

        let mut exec = healthy_host();
        let downloader = FakeDownloader::default();
        ComponentInstaller::new(&mut exec, &downloader, &config, Architecture::Amd64)
            .install(&versions())
            .await
            .unwrap();

        let order = [
            "swapoff -a",
            "apt-transport-https ca-certificates curl gpg",
            "modprobe br_netfilter",
            "sysctl --system",
            "tar Cxzf /usr/local",
            "install -m 755",
            "containerd config default",
            "systemctl enable --now containerd",
            "systemctl is-active",
            "gpg --dearmor",
            "kubelet=1.31.1-* kubeadm=1.31.1-* kubectl=1.31.1-*",
            "apt-mark hold kubelet kubeadm kubectl",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|n| exec.position(n).unwrap_or_else(|| panic!("missing command {}", n)))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", exec.commands);
        assert!(exec.ran("https://pkgs.k8s.io/core:/stable:/v1.31/deb/Release.key"));

        assert_eq!(
            tokio::fs::read_to_string(&config.paths.fstab).await.unwrap(),
            "#/swap.img none swap sw 0 0\n"
        );
        let containerd = tokio::fs::read_to_string(&config.paths.containerd_config)
            .await
            .unwrap();
        assert!(containerd.contains("SystemdCgroup = true"));
        assert!(containerd.contains("registry.k8s.io/pause:3.10"));
        assert!(!config.paths.apt_keyring.exists());
        assert!(tokio::fs::read_to_string(&config.paths.apt_list)
            .await
            .unwrap()
            .contains("v1.31/deb/ /"));

        let requested = downloader.requested();
        assert!(requested[0].ends_with("containerd-1.7.22-linux-amd64.tar.gz"));
        assert!(requested[1].ends_with("v1.1.14/runc.amd64"));
        assert!(requested[2].ends_with("containerd.service"));
    }

    #[tokio::test]
    async fn test_ip_forward_retried_once_then_fatal() {
        let root = tempfile::TempDir::new().unwrap();
        let config = sandboxed_config(root.path());
        let mut exec = healthy_host();
        exec.respond("sysctl -n net.ipv4.ip_forward", 0, "0\n");
        let downloader = FakeDownloader::default();

        let err = ComponentInstaller::new(&mut exec, &downloader, &config, Architecture::Amd64)
            .install(&versions())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Step { .. }));
        assert!(exec.ran("sysctl -w net.ipv4.ip_forward=1"));
        assert_eq!(
            exec.commands
                .iter()
                .filter(|c| c.contains("sysctl -n net.ipv4.ip_forward"))
                .count(),
            2
        );
        assert!(!exec.ran("tar Cxzf"));
        assert!(downloader.requested().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_containerd_surfaces_journal() {
        let root = tempfile::TempDir::new().unwrap();
        let config = sandboxed_config(root.path());
        let mut exec = healthy_host();
        exec.respond("systemctl is-active", 3, "")
            .respond("journalctl -u containerd -n 25", 0, "failed to load cni config\n");
        let downloader = FakeDownloader::default();

        let err = ComponentInstaller::new(&mut exec, &downloader, &config, Architecture::Arm64)
            .install(&versions())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failed to load cni config"));
        assert!(!exec.ran("apt-mark hold"));
    }

    #[tokio::test]
    async fn test_incomplete_versions_rejected_before_any_command() {
        let root = tempfile::TempDir::new().unwrap();
        let config = sandboxed_config(root.path());
        let mut exec = healthy_host();
        let downloader = FakeDownloader::default();
        let mut set = versions();
        set.shim_version.clear();

        let result = ComponentInstaller::new(&mut exec, &downloader, &config, Architecture::Amd64)
            .install(&set)
            .await;
        assert!(result.is_err());
        assert!(exec.commands.is_empty());
    }
}
