// file: src/cli/commands.rs
// version: 2.0.0
// guid: g7h8i9j0-k1l2-3456-7890-123456ghijkl

//! Command implementations for the CLI

use crate::{
    config::{
        loader::ConfigLoader, parse_control_plane_address, HostProfile, ProvisionConfig,
        VersionSet,
    },
    error::ProvisionError,
    host::{
        facts, CommandExecutor, InvokingUser, LocalExecutor, Prompter, ScriptedPrompter,
        TerminalPrompter,
    },
    network::{MetadataSource, NetworkDownloader},
    preflight, shell,
    workflow::{self, Node, UninstallOutcome, Workflow},
    Result,
};
use colored::Colorize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Host commands every install run shells out to
const REQUIRED_COMMANDS: [&str; 9] = [
    "apt-get", "apt-mark", "systemctl", "curl", "gpg", "tar", "modprobe", "sysctl", "fuser",
];

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("kube-node-provisioner").join("config.yaml"))
        .filter(|path| path.exists())
}

/// Load settings from `-c`, the per-user config file, or the defaults
pub fn load_config(path: Option<&Path>, offline: bool) -> Result<ProvisionConfig> {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    let mut config = ConfigLoader::new().load_or_default(path.as_deref())?;
    if offline {
        config.offline = true;
    }
    Ok(config)
}

/// Control-plane address from the argument (or `K8SCP_IP`), else asked for
pub fn resolve_control_plane_address(
    arg: Option<String>,
    prompter: &mut dyn Prompter,
) -> Result<Ipv4Addr> {
    let raw = match arg {
        Some(value) => value,
        None => prompter.input("Control plane IPv4 address")?,
    };
    parse_control_plane_address(&raw)
}

fn metadata_source() -> Result<Arc<dyn MetadataSource>> {
    Ok(Arc::new(NetworkDownloader::new()?))
}

fn local_node() -> Result<Node> {
    let node = Node {
        address: facts::primary_ipv4()?,
        hostname: facts::hostname()?,
    };
    info!("This node is {} ({})", node.hostname, node.address);
    Ok(node)
}

fn print_versions(versions: &VersionSet) {
    println!("{:<16} {}", "kubernetes", versions.orchestrator_version);
    println!("{:<16} {}", "containerd", versions.runtime_version);
    println!("{:<16} {}", "runc", versions.shim_version);
    println!("{:<16} {}", "cilium", versions.networking_plugin_version);
    println!("{:<16} {}", "cilium-cli", versions.networking_cli_version);
    println!("{:<16} {}", "pause", versions.sandbox_image_version);
}

/// Provision this host as the control plane
pub async fn install_control_plane_command(config_path: Option<&Path>, offline: bool) -> Result<()> {
    preflight::require_root()?;
    let config = load_config(config_path, offline)?;
    let profile = HostProfile::detect()?;
    let mut executor = LocalExecutor::new();
    let user = InvokingUser::detect(&mut executor).await?;
    let node = local_node()?;
    let downloader = NetworkDownloader::new()?;
    let mut prompter = TerminalPrompter;

    let summary = Workflow::new(
        &mut executor,
        &mut prompter,
        &downloader,
        metadata_source()?,
        &config,
    )
    .provision_control_plane(&profile, &user, &node)
    .await?;

    println!("\n=== CONTROL PLANE READY ===");
    print_versions(&summary.versions);
    println!(
        "\nAPI endpoint: {}",
        summary
            .result
            .endpoint_with_port(&config.control_plane_alias, config.api_port)
    );
    println!("kubeconfig:   {}", user.kubeconfig().display());
    println!("kubeadm log:  {}", config.paths.init_log.display());
    println!("\nTo add a worker, run on the worker node:");
    println!(
        "  sudo kube-node-provisioner install-worker {}",
        node.address
    );
    println!("then run here: kubeadm token create --print-join-command");
    Ok(())
}

/// Provision this host as a worker
pub async fn install_worker_command(
    config_path: Option<&Path>,
    control_plane_ip: Option<String>,
    offline: bool,
) -> Result<()> {
    let mut prompter = TerminalPrompter;
    let control_plane = resolve_control_plane_address(control_plane_ip, &mut prompter)?;
    info!("Using control plane at {}", control_plane);

    preflight::require_root()?;
    let config = load_config(config_path, offline)?;
    let profile = HostProfile::detect()?;
    let mut executor = LocalExecutor::new();
    let user = InvokingUser::detect(&mut executor).await?;
    let node = local_node()?;
    let downloader = NetworkDownloader::new()?;

    let summary = Workflow::new(
        &mut executor,
        &mut prompter,
        &downloader,
        metadata_source()?,
        &config,
    )
    .provision_worker(&profile, &user, &node, control_plane)
    .await?;

    println!("\n=== WORKER PREPARED ===");
    print_versions(&summary.versions);
    println!("\nThis node is not part of the cluster yet. Next steps:");
    for (i, step) in summary.result.instructions.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    Ok(())
}

/// Tear down everything the installers set up
pub async fn uninstall_command(config_path: Option<&Path>, yes: bool) -> Result<()> {
    preflight::require_root()?;
    let config = load_config(config_path, false)?;
    let mut executor = LocalExecutor::new();
    let user = match InvokingUser::detect(&mut executor).await {
        Ok(user) => Some(user),
        Err(e) => {
            warn!("Could not determine the invoking user, skipping ~/.kube and shell cleanup: {}", e);
            None
        }
    };
    let downloader = NetworkDownloader::new()?;
    let mut prompter: Box<dyn Prompter> = if yes {
        Box::new(ScriptedPrompter::assume_yes())
    } else {
        Box::new(TerminalPrompter)
    };

    let outcome = Workflow::new(
        &mut executor,
        prompter.as_mut(),
        &downloader,
        metadata_source()?,
        &config,
    )
    .uninstall(user.as_ref(), yes)
    .await?;

    match outcome {
        UninstallOutcome::Cancelled => {
            println!("Uninstall cancelled, nothing was changed");
            Ok(())
        }
        UninstallOutcome::Completed(report) => {
            println!("{}", report.render());
            let failed = report.failures().count();
            if failed == 0 {
                Ok(())
            } else {
                Err(ProvisionError::step(
                    "uninstall",
                    format!("{} cleanup step(s) failed, see the report above", failed),
                ))
            }
        }
    }
}

/// Check system prerequisites
pub async fn check_prerequisites_command() -> Result<()> {
    info!("Checking system prerequisites for Kubernetes provisioning");

    let profile = HostProfile::detect()?;
    let results = preflight::report(&profile, facts::is_root());
    let mut blocking = 0;
    for result in &results {
        let mark = if result.passed {
            "✓".green()
        } else if matches!(result.name, "cpu" | "memory") {
            blocking += 1;
            "✗".red()
        } else {
            "⚠".yellow()
        };
        println!("{} {:<14} {}", mark, result.name, result.detail);
    }

    let mut executor = LocalExecutor::new();
    let mut missing = Vec::new();
    for command in REQUIRED_COMMANDS {
        if !executor.command_exists(command).await {
            missing.push(command);
        }
    }
    if missing.is_empty() {
        println!("{} {:<14} all present", "✓".green(), "commands");
    } else {
        println!("{} {:<14} missing {}", "✗".red(), "commands", missing.join(", "));
    }

    if blocking == 0 && missing.is_empty() {
        info!("System is ready for provisioning");
        Ok(())
    } else {
        error!("Host does not meet the prerequisites");
        Err(ProvisionError::preflight(format!(
            "{} resource check(s) failed, {} required command(s) missing",
            blocking,
            missing.len()
        )))
    }
}

/// Print the versions an install would use
pub async fn versions_command(config_path: Option<&Path>, offline: bool, json: bool) -> Result<()> {
    let config = load_config(config_path, offline)?;
    let versions = workflow::resolve_versions(&config, metadata_source()?).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
    } else {
        print_versions(&versions);
    }
    Ok(())
}

/// Add the kubectl alias and completion to the invoking user's profile
pub async fn shell_setup_command() -> Result<()> {
    let mut executor = LocalExecutor::new();
    let user = InvokingUser::detect(&mut executor).await?;
    let added = shell::install(&user).await?;
    if added > 0 {
        println!("Open a new shell or source your profile to use the `k` alias");
    }
    Ok(())
}
