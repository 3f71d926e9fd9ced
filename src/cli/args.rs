// file: src/cli/args.rs
// version: 2.0.0
// guid: f6g7h8i9-j0k1-2345-6789-012345fghijk

//! Command line argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kube-node-provisioner")]
#[command(about = "Provision and tear down single-control-plane Kubernetes nodes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[arg(short, long, global = true, help = "YAML settings file")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install this host as the cluster control plane
    InstallControlPlane {
        #[arg(long, help = "Use the configured fallback versions instead of looking them up")]
        offline: bool,
    },

    /// Install this host as a worker node
    InstallWorker {
        #[arg(
            env = "K8SCP_IP",
            help = "IPv4 address of the control plane (prompted for when absent)"
        )]
        control_plane_ip: Option<String>,

        #[arg(long, help = "Use the configured fallback versions instead of looking them up")]
        offline: bool,
    },

    /// Remove everything the installers put on this host
    Uninstall {
        #[arg(short, long, help = "Do not ask for confirmation")]
        yes: bool,
    },

    /// Check system prerequisites
    CheckPrereqs,

    /// Show the versions an install would use
    Versions {
        #[arg(long, help = "Skip remote lookups")]
        offline: bool,

        #[arg(short, long)]
        json: bool,
    },

    /// Add the kubectl alias and completion to the invoking user's shell profile
    ShellSetup,
}
