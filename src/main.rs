// file: src/main.rs
// version: 2.0.0
// guid: h8i9j0k1-l2m3-4567-8901-234567hijklm

//! kube-node-provisioner - Main entry point

use clap::Parser;
use kube_node_provisioner::{
    cli::{
        args::{Cli, Commands},
        commands::*,
    },
    logging::logger,
};
use tokio::signal;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    let Cli {
        command,
        verbose,
        quiet,
        config,
    } = Cli::parse();

    if let Err(e) = logger::init_logger(verbose, quiet) {
        eprintln!("{}", e);
    }

    let config_path = config.as_deref();
    let command_future = async {
        match command {
            Commands::InstallControlPlane { offline } => {
                install_control_plane_command(config_path, offline).await
            }
            Commands::InstallWorker {
                control_plane_ip,
                offline,
            } => install_worker_command(config_path, control_plane_ip, offline).await,
            Commands::Uninstall { yes } => uninstall_command(config_path, yes).await,
            Commands::CheckPrereqs => check_prerequisites_command().await,
            Commands::Versions { offline, json } => {
                versions_command(config_path, offline, json).await
            }
            Commands::ShellSetup => shell_setup_command().await,
        }
    };

    tokio::select! {
        result = command_future => {
            if let Err(e) = result {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            warn!("Interrupted; the host may be partially provisioned, run `uninstall` to reset it");
            std::process::exit(130);
        }
    }
}
