// file: src/workflow/mod.rs
// version: 1.1.0
// guid: 93c4e1a7-5d28-4f0b-b6e9-2a71d8c05f34

//! Provisioning and teardown pipelines
//!
//! Every install run goes through the same gated phases: preflight, cleanup,
//! version resolution and component installation. The control-plane run then
//! bootstraps the cluster, the worker run registers name resolution, and both
//! finish with the shell profile. A failed phase stops the run.

use crate::bootstrap::{ClusterBootstrapper, WorkerHandoff};
use crate::cleanup::{CleanupMode, CleanupReport, StateReconciler};
use crate::config::{ClusterEndpoint, HostProfile, ProvisionConfig, VersionSet};
use crate::host::{CommandExecutor, InvokingUser, Prompter};
use crate::installer::ComponentInstaller;
use crate::logging::with_async_operation_span;
use crate::network::{Downloader, MetadataSource};
use crate::versions::VersionResolver;
use crate::{preflight, shell, Result};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Address and name of the node being provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub address: Ipv4Addr,
    pub hostname: String,
}

/// What a finished install run produced
#[derive(Debug)]
pub struct RunSummary<T> {
    pub run_id: String,
    pub versions: VersionSet,
    pub cleanup: CleanupReport,
    pub completed: Vec<&'static str>,
    pub result: T,
}

/// Result of an uninstall request
#[derive(Debug)]
pub enum UninstallOutcome {
    Cancelled,
    Completed(CleanupReport),
}

/// Resolve the version set, honoring the offline setting
pub async fn resolve_versions(
    config: &ProvisionConfig,
    source: Arc<dyn MetadataSource>,
) -> Result<VersionSet> {
    let resolver = if config.offline {
        info!("Offline mode, using configured fallback versions");
        VersionResolver::offline(&config.fallback)
    } else {
        VersionResolver::standard(source, &config.fallback)
    };
    Ok(resolver.resolve_all().await?)
}

/// Tracks which phases of a run have finished
struct PhaseLog {
    run_id: String,
    completed: Vec<&'static str>,
}

impl PhaseLog {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            completed: Vec::new(),
        }
    }

    fn record<T>(&mut self, phase: &'static str, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                info!("✓ {}", phase);
                self.completed.push(phase);
                Ok(value)
            }
            Err(e) => {
                error!("✗ {} failed: {}", phase, e);
                if !self.completed.is_empty() {
                    error!(
                        "Run {} completed before the failure: {}",
                        self.run_id,
                        self.completed.join(", ")
                    );
                    warn!("The host may be partially provisioned; `uninstall` resets it");
                }
                Err(e)
            }
        }
    }
}

/// Drives one run against the host
pub struct Workflow<'a, E: CommandExecutor> {
    executor: &'a mut E,
    prompter: &'a mut dyn Prompter,
    downloader: &'a dyn Downloader,
    source: Arc<dyn MetadataSource>,
    config: &'a ProvisionConfig,
    run_id: String,
}

impl<'a, E: CommandExecutor> Workflow<'a, E> {
    pub fn new(
        executor: &'a mut E,
        prompter: &'a mut dyn Prompter,
        downloader: &'a dyn Downloader,
        source: Arc<dyn MetadataSource>,
        config: &'a ProvisionConfig,
    ) -> Self {
        Self {
            executor,
            prompter,
            downloader,
            source,
            config,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Full control-plane run
    pub async fn provision_control_plane(
        &mut self,
        profile: &HostProfile,
        user: &InvokingUser,
        node: &Node,
    ) -> Result<RunSummary<ClusterEndpoint>> {
        info!(
            "Provisioning control plane {} ({}), run {}",
            node.hostname, node.address, self.run_id
        );
        let run_id = self.run_id.clone();
        let mut log = PhaseLog::new(&run_id);
        let (cleanup, versions) = self.prepare(profile, user, &mut log).await?;

        let config = self.config;
        let bootstrap = async {
            ClusterBootstrapper::new(self.executor, self.downloader, config, profile.architecture)
                .bootstrap_control_plane(&versions, node.address, &node.hostname, user)
                .await
        };
        let endpoint = log.record(
            "bootstrap control plane",
            with_async_operation_span("bootstrap", &run_id, bootstrap).await,
        )?;
        log.record(
            "shell setup",
            with_async_operation_span("shell", &run_id, shell::install(user)).await,
        )?;

        info!("Control plane provisioned, run {} complete", run_id);
        Ok(RunSummary {
            run_id,
            versions,
            cleanup,
            completed: log.completed,
            result: endpoint,
        })
    }

    /// Worker run; joining the cluster is left to the operator
    pub async fn provision_worker(
        &mut self,
        profile: &HostProfile,
        user: &InvokingUser,
        node: &Node,
        control_plane: Ipv4Addr,
    ) -> Result<RunSummary<WorkerHandoff>> {
        info!(
            "Provisioning worker {} ({}) for control plane {}, run {}",
            node.hostname, node.address, control_plane, self.run_id
        );
        let run_id = self.run_id.clone();
        let mut log = PhaseLog::new(&run_id);
        let (cleanup, versions) = self.prepare(profile, user, &mut log).await?;

        let config = self.config;
        let register = async {
            ClusterBootstrapper::new(self.executor, self.downloader, config, profile.architecture)
                .prepare_worker(control_plane, node.address, &node.hostname)
                .await
        };
        let handoff = log.record(
            "register worker",
            with_async_operation_span("bootstrap", &run_id, register).await,
        )?;
        log.record(
            "shell setup",
            with_async_operation_span("shell", &run_id, shell::install(user)).await,
        )?;

        Ok(RunSummary {
            run_id,
            versions,
            cleanup,
            completed: log.completed,
            result: handoff,
        })
    }

    /// Teardown, confirmed interactively unless `assume_yes`
    pub async fn uninstall(
        &mut self,
        user: Option<&InvokingUser>,
        assume_yes: bool,
    ) -> Result<UninstallOutcome> {
        if !assume_yes
            && !self.prompter.confirm(
                "This removes Kubernetes, containerd and Cilium from this host. Continue?",
            )?
        {
            warn!("Uninstall cancelled");
            return Ok(UninstallOutcome::Cancelled);
        }

        let run_id = self.run_id.clone();
        let report = with_async_operation_span(
            "cleanup",
            &run_id,
            self.cleanup(user, CleanupMode::Uninstall),
        )
        .await;
        if report.is_clean() {
            info!("Uninstall complete, run {}", run_id);
        } else {
            warn!(
                "Uninstall finished with {} failed step(s)",
                report.failures().count()
            );
        }
        Ok(UninstallOutcome::Completed(report))
    }

    async fn prepare(
        &mut self,
        profile: &HostProfile,
        user: &InvokingUser,
        log: &mut PhaseLog,
    ) -> Result<(CleanupReport, VersionSet)> {
        let run_id = self.run_id.clone();

        let checks = async {
            preflight::validate(profile)?;
            preflight::check_os(profile);
            Ok::<(), crate::error::ProvisionError>(())
        };
        log.record(
            "preflight",
            with_async_operation_span("preflight", &run_id, checks).await,
        )?;

        let report = with_async_operation_span(
            "cleanup",
            &run_id,
            self.cleanup(Some(user), CleanupMode::Install),
        )
        .await;
        if !report.is_clean() {
            warn!(
                "Cleanup left {} failed step(s), continuing",
                report.failures().count()
            );
        }
        log.record("cleanup", Ok(()))?;

        let versions = log.record(
            "resolve versions",
            with_async_operation_span(
                "versions",
                &run_id,
                resolve_versions(self.config, self.source.clone()),
            )
            .await,
        )?;
        info!(
            "Kubernetes {}, containerd {}, runc {}, Cilium {}, cilium CLI {}, pause {}",
            versions.orchestrator_version,
            versions.runtime_version,
            versions.shim_version,
            versions.networking_plugin_version,
            versions.networking_cli_version,
            versions.sandbox_image_version
        );

        let config = self.config;
        let install = async {
            ComponentInstaller::new(self.executor, self.downloader, config, profile.architecture)
                .install(&versions)
                .await
        };
        log.record(
            "install components",
            with_async_operation_span("install", &run_id, install).await,
        )?;

        Ok((report, versions))
    }

    async fn cleanup(&mut self, user: Option<&InvokingUser>, mode: CleanupMode) -> CleanupReport {
        let report = StateReconciler::new(self.executor, self.prompter, self.config, user)
            .with_mode(mode)
            .run()
            .await;
        info!("Cleanup report:\n{}", report.render());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Architecture, OsFamily};
    use crate::error::ProvisionError;
    use crate::host::executor::fake::FakeExecutor;
    use crate::host::ScriptedPrompter;
    use crate::installer::tests::{healthy_host, sandboxed_config};
    use crate::network::fake::{FakeDownloader, FakeSource};
    use std::path::Path;
    use tempfile::TempDir;

    const HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    fn profile(cpu_count: usize, ram_gib: u64) -> HostProfile {
        HostProfile {
            cpu_count,
            ram_bytes: ram_gib * 1024 * 1024 * 1024,
            os_family: OsFamily::Ubuntu,
            architecture: Architecture::Amd64,
        }
    }

    fn operator(home: &Path) -> InvokingUser {
        InvokingUser {
            name: "dev".to_string(),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            home: home.to_path_buf(),
            shell: "/bin/bash".to_string(),
        }
    }

    /// Offline config rooted in `root`, with admin.conf outside the state dirs
    async fn offline_config(root: &Path) -> ProvisionConfig {
        let mut config = sandboxed_config(root);
        config.offline = true;
        config.paths.admin_kubeconfig = root.join("admin.conf");
        tokio::fs::write(&config.paths.admin_kubeconfig, "apiVersion: v1\n")
            .await
            .unwrap();
        tokio::fs::create_dir_all(root.join("etc")).await.unwrap();
        tokio::fs::write(&config.paths.hosts_file, "127.0.0.1 localhost\n")
            .await
            .unwrap();
        config
    }

    /// Nothing left over from earlier runs, everything installs cleanly
    fn fresh_host() -> FakeExecutor {
        let mut exec = healthy_host();
        exec.respond("systemctl list-unit-files", 1, "")
            .respond("fuser 6443/tcp", 1, "")
            .respond("pkill", 1, "")
            .respond("dpkg-query", 1, "")
            .respond("ip link show", 1, "")
            .respond("modprobe -r", 1, "")
            .respond("jsonpath", 0, "node-role.kubernetes.io/control-plane");
        exec
    }

    fn cilium_downloads() -> FakeDownloader {
        FakeDownloader::default()
            .with(".tar.gz", b"hello\n")
            .with(".sha256sum", format!("{}  cilium-linux-amd64.tar.gz\n", HELLO).as_bytes())
    }

    fn node() -> Node {
        Node {
            address: Ipv4Addr::new(10, 0, 0, 5),
            hostname: "cp1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_small_host_rejected_before_any_command() {
        let root = TempDir::new().unwrap();
        let config = offline_config(root.path()).await;
        let mut exec = FakeExecutor::new();
        let mut prompter = ScriptedPrompter::assume_yes();
        let downloader = FakeDownloader::default();
        let user = operator(&root.path().join("home"));

        let err = Workflow::new(
            &mut exec,
            &mut prompter,
            &downloader,
            Arc::new(FakeSource::default()),
            &config,
        )
        .provision_control_plane(&profile(1, 8), &user, &node())
        .await
        .unwrap_err();

        assert!(matches!(err, ProvisionError::Preflight(_)));
        assert!(exec.commands.is_empty());
        assert!(downloader.requested().is_empty());
    }

    #[tokio::test]
    async fn test_control_plane_end_to_end() {
        let root = TempDir::new().unwrap();
        let config = offline_config(root.path()).await;
        let home = root.path().join("home");
        tokio::fs::create_dir_all(&home).await.unwrap();
        let user = operator(&home);
        let mut exec = fresh_host();
        let mut prompter = ScriptedPrompter::assume_yes();
        let downloader = cilium_downloads();

        let summary = Workflow::new(
            &mut exec,
            &mut prompter,
            &downloader,
            Arc::new(FakeSource::default()),
            &config,
        )
        .provision_control_plane(&profile(4, 8), &user, &node())
        .await
        .unwrap();

        assert_eq!(
            summary.completed,
            vec![
                "preflight",
                "cleanup",
                "resolve versions",
                "install components",
                "bootstrap control plane",
                "shell setup"
            ]
        );
        assert_eq!(summary.versions.orchestrator_version, "1.31.1");
        assert_eq!(summary.result.api_version_tag, "v1beta4");

        let order = [
            "fuser 6443/tcp",
            "swapoff -a",
            "apt-mark hold kubelet kubeadm kubectl",
            "kubeadm init --config",
            "cilium install --version 1.16.2",
            "taint nodes --all node-role.kubernetes.io/control-plane-",
            "cilium status --wait",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|n| exec.position(n).unwrap_or_else(|| panic!("missing command {}", n)))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", exec.commands);

        let bashrc = tokio::fs::read_to_string(home.join(".bashrc")).await.unwrap();
        assert!(bashrc.contains(shell::MARKER));
        assert!(home.join(".kube/config").exists());
    }

    #[tokio::test]
    async fn test_failed_install_stops_before_bootstrap() {
        let root = TempDir::new().unwrap();
        let config = offline_config(root.path()).await;
        let user = operator(&root.path().join("home"));
        let mut exec = fresh_host();
        exec.respond("systemctl is-active", 3, "");
        let mut prompter = ScriptedPrompter::assume_yes();
        let downloader = cilium_downloads();

        let err = Workflow::new(
            &mut exec,
            &mut prompter,
            &downloader,
            Arc::new(FakeSource::default()),
            &config,
        )
        .provision_control_plane(&profile(4, 8), &user, &node())
        .await
        .unwrap_err();

        assert!(matches!(err, ProvisionError::Step { .. }));
        assert!(exec.ran("journalctl -u containerd"));
        assert!(!exec.ran("kubeadm init"));
    }

    #[tokio::test]
    async fn test_worker_run_hands_off_join() {
        let root = TempDir::new().unwrap();
        let config = offline_config(root.path()).await;
        let home = root.path().join("home");
        tokio::fs::create_dir_all(&home).await.unwrap();
        let user = operator(&home);
        let mut exec = fresh_host();
        let mut prompter = ScriptedPrompter::assume_yes();
        let downloader = cilium_downloads();
        let worker = Node {
            address: Ipv4Addr::new(10, 0, 0, 7),
            hostname: "worker1".to_string(),
        };

        let summary = Workflow::new(
            &mut exec,
            &mut prompter,
            &downloader,
            Arc::new(FakeSource::default()),
            &config,
        )
        .provision_worker(&profile(2, 4), &user, &worker, Ipv4Addr::new(10, 0, 0, 5))
        .await
        .unwrap();

        assert!(exec.ran("apt-mark hold"));
        assert!(!exec.ran("kubeadm init"));
        assert!(!exec.ran("cilium install"));
        assert_eq!(summary.result.control_plane_address, Ipv4Addr::new(10, 0, 0, 5));
        let hosts = tokio::fs::read_to_string(&config.paths.hosts_file).await.unwrap();
        assert!(hosts.contains("10.0.0.5 k8scp"));
        assert!(hosts.contains("10.0.0.7 worker1"));
    }

    #[tokio::test]
    async fn test_declined_uninstall_changes_nothing() {
        let root = TempDir::new().unwrap();
        let config = offline_config(root.path()).await;
        let mut exec = FakeExecutor::new();
        let mut prompter = ScriptedPrompter::with_answers(["n"]);
        let downloader = FakeDownloader::default();

        let outcome = Workflow::new(
            &mut exec,
            &mut prompter,
            &downloader,
            Arc::new(FakeSource::default()),
            &config,
        )
        .uninstall(None, false)
        .await
        .unwrap();

        assert!(matches!(outcome, UninstallOutcome::Cancelled));
        assert!(exec.commands.is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_uninstall_reports_every_step() {
        let root = TempDir::new().unwrap();
        let config = offline_config(root.path()).await;
        let mut exec = fresh_host();
        let mut prompter = ScriptedPrompter::with_answers(["yes"]);
        let downloader = FakeDownloader::default();

        let outcome = Workflow::new(
            &mut exec,
            &mut prompter,
            &downloader,
            Arc::new(FakeSource::default()),
            &config,
        )
        .uninstall(None, false)
        .await
        .unwrap();

        match outcome {
            UninstallOutcome::Completed(report) => {
                assert!(report.is_clean(), "{}", report.render());
                assert!(report.outcome_of("daemon-reload").is_some());
            }
            UninstallOutcome::Cancelled => panic!("uninstall was confirmed"),
        }
    }

    #[tokio::test]
    async fn test_resolve_versions_offline_uses_fallbacks() {
        let mut config = ProvisionConfig::default();
        config.offline = true;
        config.fallback.kubernetes = "1.30.4".to_string();

        let versions = resolve_versions(&config, Arc::new(FakeSource::default()))
            .await
            .unwrap();

        assert_eq!(versions.orchestrator_version, "1.30.4");
        assert_eq!(versions.sandbox_image_version, "3.9");
    }
}
