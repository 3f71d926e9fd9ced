// file: src/lib.rs
// version: 3.0.0
// guid: d82472d1-7f0f-4eb4-b0a3-6e1547103eb4

//! # kube-node-provisioner
//!
//! Provisions and tears down a single-control-plane Kubernetes cluster on
//! Ubuntu/Debian hosts: containerd and runc, the kubelet/kubeadm/kubectl
//! packages, the Cilium CNI and shell ergonomics.
//!
//! Every run is safe to repeat against a host in an unknown state. Installs
//! first reconcile the host back to a clean baseline, then move through
//! gated phases; teardown records one outcome per step instead of stopping
//! at the first problem.

pub mod bootstrap;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod installer;
pub mod logging;
pub mod network;
pub mod preflight;
pub mod shell;
pub mod versions;
pub mod workflow;

pub use error::{ProvisionError, Result};

/// Version information for the provisioner
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
