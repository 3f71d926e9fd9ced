// file: src/cleanup/reconciler.rs
// version: 1.1.0
// guid: 7c02e4a6-d19b-4e38-9f57-b26a1c8d03e5

//! The teardown sequence

use super::{CleanupReport, Outcome};
use crate::config::ProvisionConfig;
use crate::host::{CommandExecutor, HostsFile, InvokingUser, Prompter};
use crate::shell;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Daemons that may outlive their systemd units
const DAEMONS: [&str; 6] = [
    "kube-apiserver",
    "kube-controller-manager",
    "kube-scheduler",
    "etcd",
    "kube-proxy",
    "kubelet",
];

const SERVICES: [&str; 2] = ["kubelet", "containerd"];

const PACKAGES: [&str; 5] = ["kubelet", "kubeadm", "kubectl", "kubernetes-cni", "cri-tools"];

const CILIUM_LINKS: [&str; 3] = ["cilium_host", "cilium_net", "cilium_vxlan"];

const KERNEL_MODULES: [&str; 2] = ["br_netfilter", "overlay"];

/// Why the teardown runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// Clearing leftovers before an install; never asks questions
    Install,
    /// Explicit `uninstall`; keeps a hosts backup and may offer to restore one
    Uninstall,
}

/// Drives the host back towards its pre-install state
pub struct StateReconciler<'a, E: CommandExecutor> {
    executor: &'a mut E,
    prompter: &'a mut dyn Prompter,
    config: &'a ProvisionConfig,
    user: Option<&'a InvokingUser>,
    mode: CleanupMode,
}

impl<'a, E: CommandExecutor> StateReconciler<'a, E> {
    pub fn new(
        executor: &'a mut E,
        prompter: &'a mut dyn Prompter,
        config: &'a ProvisionConfig,
        user: Option<&'a InvokingUser>,
    ) -> Self {
        Self {
            executor,
            prompter,
            config,
            user,
            mode: CleanupMode::Uninstall,
        }
    }

    pub fn with_mode(mut self, mode: CleanupMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run every step; never fails, problems land in the report
    pub async fn run(&mut self) -> CleanupReport {
        info!("Starting cleanup of previous installation state");
        let config = self.config;
        let mut report = CleanupReport::new();

        // Needs a live API server and admin.conf
        let outcome = self.uninstall_cilium().await;
        report.record("cilium uninstall", outcome);

        for service in SERVICES {
            let outcome = self.stop_service(service).await;
            report.record(format!("stop {}", service), outcome);
        }
        let outcome = self.free_api_port().await;
        report.record(format!("free port {}", config.api_port), outcome);
        let outcome = self.kill_daemons().await;
        report.record("kill daemons", outcome);
        let outcome = self.kubeadm_reset().await;
        report.record("kubeadm reset", outcome);
        let outcome = self.purge_packages().await;
        report.record("purge packages", outcome);

        for dir in &config.paths.state_dirs {
            report.record(format!("remove {}", dir.display()), remove_path(dir).await);
        }
        let outcome = match self.user {
            Some(user) => remove_path(&user.home.join(".kube")).await,
            None => Outcome::skipped("invoking user unknown"),
        };
        report.record("remove ~/.kube", outcome);

        let outcome = self.remove_cached_images().await;
        report.record("remove cached images", outcome);
        let outcome = self.remove_cilium_leftovers().await;
        report.record("cilium leftovers", outcome);
        let outcome = self.remove_cilium_links().await;
        report.record("cilium interfaces", outcome);

        let paths = &config.paths;
        for file in [&paths.apt_list, &paths.apt_keyring, &paths.sysctl_file, &paths.modules_file] {
            report.record(format!("remove {}", file.display()), remove_path(file).await);
        }
        let outcome = self.unload_modules().await;
        report.record("unload kernel modules", outcome);
        for file in paths.binaries.iter().chain(std::iter::once(&paths.containerd_unit)) {
            report.record(format!("remove {}", file.display()), remove_path(file).await);
        }

        let outcome = self.clean_hosts_file().await;
        report.record("hosts entry", outcome);
        let outcome = self.clean_shell_profile().await;
        report.record("shell profile", outcome);
        let outcome = self.daemon_reload().await;
        report.record("daemon-reload", outcome);
        let outcome = self.verify_port_free().await;
        report.record("port check", outcome);

        if report.is_clean() {
            info!("Cleanup finished");
        } else {
            warn!("Cleanup finished with {} failed step(s)", report.failures().count());
        }
        report
    }

    async fn stop_service(&mut self, service: &str) -> Outcome {
        let probe = format!("systemctl list-unit-files {}.service | grep -q '^{}.service'", service, service);
        if !self.executor.check_silent(&probe).await.unwrap_or(false) {
            return Outcome::skipped("unit not installed");
        }
        self.executor
            .execute(&format!("systemctl stop {}", service))
            .await
            .map(|_| String::new())
            .into()
    }

    async fn port_bound(&mut self) -> bool {
        let probe = format!("fuser {}/tcp", self.config.api_port);
        self.executor.check_silent(&probe).await.unwrap_or(false)
    }

    async fn port_holder(&mut self) -> String {
        let cmd = format!("ss -ltnp 'sport = :{}'", self.config.api_port);
        match self.executor.execute_with_output(&cmd).await {
            Ok(out) => out
                .lines()
                .skip(1)
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("; "),
            Err(_) => "unknown process".to_string(),
        }
    }

    async fn free_api_port(&mut self) -> Outcome {
        if !self.port_bound().await {
            return Outcome::skipped("port not in use");
        }
        let port = self.config.api_port;

        for (signal, attempt) in [("", "TERM"), ("-KILL ", "KILL")] {
            let cmd = format!("fuser -k {}{}/tcp", signal, port);
            if let Err(e) = self.executor.execute_with_error_collection(&cmd, "free API port").await {
                return Outcome::failed(e.to_string());
            }
            tokio::time::sleep(Duration::from_secs(self.config.port_grace_secs)).await;
            if !self.port_bound().await {
                return Outcome::ok(format!("holder stopped with {}", attempt));
            }
            warn!("Port {} still bound after {}", port, attempt);
        }

        let holder = self.port_holder().await;
        Outcome::failed(format!("port {} still held by {}", port, holder))
    }

    async fn kill_daemons(&mut self) -> Outcome {
        let mut killed = Vec::new();
        for daemon in DAEMONS {
            let cmd = format!("pkill -x {}", daemon);
            match self.executor.execute_with_error_collection(&cmd, "kill daemon").await {
                Ok((0, _, _)) => killed.push(daemon),
                Ok(_) => {}
                Err(e) => return Outcome::failed(e.to_string()),
            }
        }
        if killed.is_empty() {
            Outcome::skipped("none running")
        } else {
            Outcome::ok(killed.join(", "))
        }
    }

    async fn kubeadm_reset(&mut self) -> Outcome {
        if !self.executor.command_exists("kubeadm").await {
            return Outcome::skipped("kubeadm not installed");
        }
        self.executor
            .execute("kubeadm reset -f")
            .await
            .map(|_| String::new())
            .into()
    }

    async fn purge_packages(&mut self) -> Outcome {
        let probe = format!(
            "dpkg-query -W -f='${{Status}}\\n' {} 2>/dev/null | grep -q 'install ok installed'",
            PACKAGES.join(" ")
        );
        if !self.executor.check_silent(&probe).await.unwrap_or(false) {
            return Outcome::skipped("no packages installed");
        }

        let held = PACKAGES[..3].join(" ");
        let steps = [
            format!("apt-mark unhold {}", held),
            format!(
                "DEBIAN_FRONTEND=noninteractive apt-get purge -y --allow-change-held-packages {}",
                PACKAGES.join(" ")
            ),
            "DEBIAN_FRONTEND=noninteractive apt-get autoremove -y".to_string(),
        ];
        for cmd in &steps {
            if let Err(e) = self.executor.execute(cmd).await {
                return Outcome::failed(e.to_string());
            }
        }
        Outcome::ok(PACKAGES.join(", "))
    }

    async fn remove_cached_images(&mut self) -> Outcome {
        if !self.executor.command_exists("crictl").await {
            return Outcome::skipped("crictl not installed");
        }
        self.executor
            .execute("crictl rmi --all")
            .await
            .map(|_| String::new())
            .into()
    }

    async fn uninstall_cilium(&mut self) -> Outcome {
        if !self.executor.command_exists("cilium").await {
            return Outcome::skipped("cilium CLI not installed");
        }
        let admin = &self.config.paths.admin_kubeconfig;
        if !admin.exists() {
            return Outcome::skipped("cluster unreachable: no admin kubeconfig");
        }
        let cmd = format!(
            "KUBECONFIG={} cilium uninstall --wait --timeout {}",
            admin.display(),
            self.config.cilium_uninstall_timeout
        );
        match self.executor.execute_with_error_collection(&cmd, "cilium uninstall").await {
            Ok((0, _, _)) => Outcome::ok(""),
            Ok((code, stdout, stderr)) => {
                let detail = if stderr.trim().is_empty() { stdout } else { stderr };
                let reason = detail.lines().next().unwrap_or_default().trim().to_string();
                warn!("cilium uninstall exited with {}: {}", code, reason);
                Outcome::skipped(format!("cluster unreachable: {}", reason))
            }
            Err(e) => Outcome::failed(e.to_string()),
        }
    }

    async fn remove_cilium_leftovers(&mut self) -> Outcome {
        let dir = &self.config.paths.cni_conf_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Outcome::skipped(format!("{} absent", dir.display()))
            }
            Err(e) => return Outcome::failed(e.to_string()),
        };

        let mut removed = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Outcome::failed(e.to_string()),
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains("cilium") {
                if let Outcome::Failed(reason) = remove_path(&entry.path()).await {
                    return Outcome::failed(reason);
                }
                removed.push(name);
            }
        }

        if removed.is_empty() {
            Outcome::skipped("none found")
        } else {
            Outcome::ok(removed.join(", "))
        }
    }

    async fn remove_cilium_links(&mut self) -> Outcome {
        let mut deleted = Vec::new();
        for link in CILIUM_LINKS {
            let exists = self
                .executor
                .check_silent(&format!("ip link show {} >/dev/null 2>&1", link))
                .await
                .unwrap_or(false);
            if !exists {
                continue;
            }
            if let Err(e) = self.executor.execute(&format!("ip link delete {}", link)).await {
                return Outcome::failed(e.to_string());
            }
            deleted.push(link);
        }
        if deleted.is_empty() {
            Outcome::skipped("no interfaces present")
        } else {
            Outcome::ok(deleted.join(", "))
        }
    }

    async fn unload_modules(&mut self) -> Outcome {
        let cmd = format!("modprobe -r {}", KERNEL_MODULES.join(" "));
        match self.executor.execute_with_error_collection(&cmd, "unload kernel modules").await {
            Ok((0, _, _)) => Outcome::ok(KERNEL_MODULES.join(", ")),
            Ok((_, _, stderr)) => Outcome::skipped(format!("still in use: {}", stderr.trim())),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }

    async fn clean_hosts_file(&mut self) -> Outcome {
        let alias = self.config.control_plane_alias.as_str();
        let hosts = HostsFile::new(&self.config.paths.hosts_file);

        match hosts.contains(alias).await {
            Ok(false) => return Outcome::skipped(format!("no {} entry", alias)),
            Ok(true) => {}
            Err(e) => return Outcome::failed(e.to_string()),
        }

        if self.mode == CleanupMode::Install {
            return hosts
                .remove_name(alias)
                .await
                .map(|_| format!("removed {}", alias))
                .into();
        }

        let backup = hosts.backup_path();
        if backup.exists() {
            let question = format!(
                "A backup of {} from an earlier uninstall exists at {}. Restore it?",
                hosts.path().display(),
                backup.display()
            );
            match self.prompter.confirm(&question) {
                Ok(true) => {
                    let result = async {
                        hosts.restore_backup().await?;
                        hosts.remove_name(alias).await?;
                        Ok::<_, crate::error::ProvisionError>(format!(
                            "restored from {}",
                            backup.display()
                        ))
                    }
                    .await;
                    return result.into();
                }
                Ok(false) => {}
                Err(e) => return Outcome::failed(e.to_string()),
            }
        } else if let Err(e) = hosts.backup().await {
            return Outcome::failed(e.to_string());
        }

        hosts
            .remove_name(alias)
            .await
            .map(|_| format!("removed {}", alias))
            .into()
    }

    async fn clean_shell_profile(&mut self) -> Outcome {
        let Some(user) = self.user else {
            return Outcome::skipped("invoking user unknown");
        };
        let profile = shell::profile_for(&user.shell);
        let rc = profile.rc_file(&user.home);
        match shell::strip_with_backup(&rc, profile).await {
            Ok(Some(backup)) => Outcome::ok(format!("backup {}", backup.display())),
            Ok(None) => Outcome::skipped("nothing to strip"),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }

    async fn daemon_reload(&mut self) -> Outcome {
        self.executor
            .execute("systemctl daemon-reload")
            .await
            .map(|_| String::new())
            .into()
    }

    async fn verify_port_free(&mut self) -> Outcome {
        if self.port_bound().await {
            let holder = self.port_holder().await;
            Outcome::failed(format!("port {} held by {}", self.config.api_port, holder))
        } else {
            Outcome::ok(format!("port {} free", self.config.api_port))
        }
    }
}

/// Remove a file or directory tree, absent counts as skipped
async fn remove_path(path: &Path) -> Outcome {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Outcome::skipped("absent"),
        Err(e) => return Outcome::failed(e.to_string()),
    };
    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Outcome::ok(""),
        Err(e) => Outcome::failed(format!("{}: {}", path.display(), e)),
    }
}
