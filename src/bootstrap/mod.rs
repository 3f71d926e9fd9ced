// file: src/bootstrap/mod.rs
// version: 1.0.0
// guid: 0f6a3d92-7e1b-4c58-a4d3-95b20e7c8f16

//! Cluster bring-up after the components are installed
//!
//! The control-plane path initialises the cluster and installs Cilium. The
//! worker path only registers name resolution; joining stays a manual step
//! and is described by the returned [`WorkerHandoff`].

pub mod cilium;
pub mod kubeadm;

use crate::config::{
    Architecture, ClusterEndpoint, HostRegistrationEntry, ProvisionConfig, VersionSet,
};
use crate::error::ProvisionError;
use crate::host::{CommandExecutor, HostsFile, InvokingUser};
use crate::network::Downloader;
use crate::versions::major_minor;
use crate::Result;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Taint kubeadm puts on a control-plane node
pub const CONTROL_PLANE_TAINT: &str = "node-role.kubernetes.io/control-plane";

/// What the operator must do to finish a worker node
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHandoff {
    pub control_plane_address: Ipv4Addr,
    pub alias: String,
    pub instructions: Vec<String>,
}

impl WorkerHandoff {
    fn new(control_plane_address: Ipv4Addr, alias: &str) -> Self {
        Self {
            control_plane_address,
            alias: alias.to_string(),
            instructions: vec![
                format!(
                    "On the control plane ({}), run: kubeadm token create --print-join-command",
                    control_plane_address
                ),
                "Run the printed 'kubeadm join ...' command on this node with sudo".to_string(),
            ],
        }
    }
}

/// Brings a node into the cluster
pub struct ClusterBootstrapper<'a, E: CommandExecutor> {
    executor: &'a mut E,
    downloader: &'a dyn Downloader,
    config: &'a ProvisionConfig,
    arch: Architecture,
}

impl<'a, E: CommandExecutor> ClusterBootstrapper<'a, E> {
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

    fn kubectl(&self, args: &str) -> String {
        format!(
            "kubectl --kubeconfig {} {}",
            self.config.paths.admin_kubeconfig.display(),
            args
        )
    }

    fn cilium(&self, args: &str) -> String {
        format!(
            "KUBECONFIG={} cilium {}",
            self.config.paths.admin_kubeconfig.display(),
            args
        )
    }

    async fn log_and_execute(&mut self, step: &str, command: &str) -> Result<()> {
        info!("{}", step);
        self.executor
            .execute(command)
            .await
            .map_err(|e| ProvisionError::step(step, e.to_string()))
    }

    /// Initialise a single control-plane cluster on this node
    pub async fn bootstrap_control_plane(
        &mut self,
        versions: &VersionSet,
        address: Ipv4Addr,
        hostname: &str,
        user: &InvokingUser,
    ) -> Result<ClusterEndpoint> {
        let config = self.config;
        let alias = config.control_plane_alias.as_str();

        HostsFile::new(&config.paths.hosts_file)
            .upsert(&[
                HostRegistrationEntry::new(address.to_string(), alias),
                HostRegistrationEntry::new(address.to_string(), hostname),
            ])
            .await?;

        let schema = self.detect_schema(&versions.orchestrator_version).await?;
        let endpoint = ClusterEndpoint {
            control_plane_address: address,
            control_plane_hostname: hostname.to_string(),
            pod_subnet_cidr: config.pod_subnet.clone(),
            api_version_tag: schema,
        };
        self.write_kubeadm_config(&endpoint, versions).await?;
        self.kubeadm_init().await?;
        self.install_kubeconfig(user).await?;
        let cluster_info = self.kubectl("cluster-info");
        self.log_and_execute("Checking API server", &cluster_info).await?;

        let work = TempDir::new()?;
        cilium::install_cli(
            self.executor,
            self.downloader,
            &versions.networking_cli_version,
            self.arch,
            work.path(),
        )
        .await
        .map_err(|e| ProvisionError::step("Installing cilium CLI", e.to_string()))?;
        let install = self.cilium(&format!("install --version {}", versions.networking_plugin_version));
        self.log_and_execute("Installing Cilium", &install).await?;

        self.remove_control_plane_taint().await?;
        let status = self.cilium(&format!("status --wait --wait-duration {}", config.cilium_wait));
        self.log_and_execute("Waiting for Cilium", &status).await?;
        self.connectivity_test().await;

        info!(
            "Control plane ready at {}",
            endpoint.endpoint_with_port(alias, config.api_port)
        );
        Ok(endpoint)
    }

    /// Register name resolution for a worker and describe the manual join
    pub async fn prepare_worker(
        &mut self,
        control_plane: Ipv4Addr,
        local_address: Ipv4Addr,
        hostname: &str,
    ) -> Result<WorkerHandoff> {
        let alias = self.config.control_plane_alias.as_str();
        HostsFile::new(&self.config.paths.hosts_file)
            .upsert(&[
                HostRegistrationEntry::new(control_plane.to_string(), alias),
                HostRegistrationEntry::new(local_address.to_string(), hostname),
            ])
            .await?;
        Ok(WorkerHandoff::new(control_plane, alias))
    }

    async fn detect_schema(&mut self, orchestrator_version: &str) -> Result<String> {
        match self
            .executor
            .execute_with_output("kubeadm config print init-defaults")
            .await
        {
            Ok(out) => {
                if let Some(schema) = kubeadm::parse_schema(&out) {
                    info!("kubeadm reports config schema {}", schema);
                    return Ok(schema);
                }
                warn!("kubeadm init-defaults carried no kubeadm apiVersion");
            }
            Err(e) => warn!("Could not introspect kubeadm defaults: {}", e),
        }

        let (_, minor) = major_minor(orchestrator_version).ok_or_else(|| {
            crate::versions::ResolutionError::OrchestratorUnparseable(orchestrator_version.to_string())
        })?;
        let schema = kubeadm::schema_for_minor(minor);
        info!("Using config schema {} for Kubernetes 1.{}", schema, minor);
        Ok(schema.to_string())
    }

    async fn write_kubeadm_config(&mut self, endpoint: &ClusterEndpoint, versions: &VersionSet) -> Result<()> {
        let config = self.config;
        let path = &config.paths.kubeadm_config;
        let settings = kubeadm::ClusterSettings {
            schema: endpoint.api_version_tag.clone(),
            kubernetes_version: versions.orchestrator_version.clone(),
            control_plane_endpoint: format!("{}:{}", config.control_plane_alias, config.api_port),
            pod_subnet: endpoint.pod_subnet_cidr.clone(),
        };

        let rendered = match tokio::fs::read_to_string(path).await {
            Ok(existing) => {
                info!("Patching existing {}", path.display());
                kubeadm::patch(&existing, &settings)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Writing {}", path.display());
                kubeadm::render(&settings)?
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, rendered).await?;
        Ok(())
    }

    async fn kubeadm_init(&mut self) -> Result<()> {
        let config = self.config;
        let command = format!(
            "kubeadm init --config {} --upload-certs",
            config.paths.kubeadm_config.display()
        );
        let (code, stdout, stderr) = self
            .executor
            .execute_with_error_collection(&command, "kubeadm init")
            .await?;

        let log = &config.paths.init_log;
        tokio::fs::write(log, format!("{}{}", stdout, stderr)).await?;
        debug!("kubeadm init output saved to {}", log.display());

        if code != 0 {
            return Err(ProvisionError::Process {
                command,
                exit_code: Some(code),
                stderr: format!("{} (full output in {})", stderr.trim_end(), log.display()),
            });
        }
        Ok(())
    }

    async fn install_kubeconfig(&mut self, user: &InvokingUser) -> Result<()> {
        let admin = &self.config.paths.admin_kubeconfig;
        let target = user.kubeconfig();
        info!("Copying {} to {}", admin.display(), target.display());

        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
            chown_if_root(dir, user)?;
        }
        tokio::fs::copy(admin, &target).await?;
        chown_if_root(&target, user)?;
        Ok(())
    }

    async fn remove_control_plane_taint(&mut self) -> Result<()> {
        let query = self.kubectl("get nodes -o jsonpath='{.items[*].spec.taints[*].key}'");
        let taints = self.executor.execute_with_output(&query).await?;
        if !taints.split_whitespace().any(|t| t == CONTROL_PLANE_TAINT) {
            debug!("No control-plane taint present");
            return Ok(());
        }
        let untaint = self.kubectl(&format!("taint nodes --all {}-", CONTROL_PLANE_TAINT));
        self.log_and_execute("Removing control-plane taint", &untaint)
            .await
    }

    async fn connectivity_test(&mut self) {
        let command = self.cilium("connectivity test");
        match self
            .executor
            .execute_with_error_collection(&command, "cilium connectivity test")
            .await
        {
            Ok((0, _, _)) => info!("Cilium connectivity test passed"),
            Ok((code, _, _)) => warn!(
                "Cilium connectivity test exited with {}; the cluster may still be usable, check `cilium status`",
                code
            ),
            Err(e) => warn!("Cilium connectivity test could not run: {}", e),
        }
    }
}

fn chown_if_root(path: &Path, user: &InvokingUser) -> Result<()> {
    if crate::host::facts::is_root() {
        std::os::unix::fs::chown(path, Some(user.uid), Some(user.gid))?;
    }
    Ok(())
}
