// file: tests/cli_test.rs
// version: 1.0.0
// guid: 4e8b1c07-a3d2-4f69-95e0-c7b12d6f8a31

//! Command line behaviour that needs neither root nor network access

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn provisioner() -> Command {
    let mut cmd = Command::cargo_bin("kube-node-provisioner").unwrap();
    cmd.env_remove("K8SCP_IP").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    provisioner()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install-control-plane"))
        .stdout(predicate::str::contains("install-worker"))
        .stdout(predicate::str::contains("uninstall"))
        .stdout(predicate::str::contains("check-prereqs"))
        .stdout(predicate::str::contains("shell-setup"));
}

#[test]
fn test_version_flag() {
    provisioner()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_worker_rejects_malformed_addresses() {
    for bad in ["abc", "10.0.0", "", "10.0.0.256"] {
        provisioner()
            .args(["install-worker", bad])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid control-plane address"));
    }
}

#[test]
fn test_worker_rejects_malformed_env_address() {
    provisioner()
        .arg("install-worker")
        .env("K8SCP_IP", "not-an-address")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not-an-address"));
}

#[test]
fn test_offline_versions_as_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let settings = dir.path().join("settings.yaml");
    std::fs::write(&settings, "fallback:\n  kubernetes: 1.30.2\n  containerd: 1.7.20\n")?;

    let output = provisioner()
        .args(["versions", "--offline", "--json", "-q", "-c"])
        .arg(&settings)
        .output()?;
    assert!(output.status.success());

    let versions: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(versions["orchestrator_version"], "1.30.2");
    assert_eq!(versions["runtime_version"], "1.7.20");
    assert_eq!(versions["sandbox_image_version"], "3.9");
    assert_eq!(versions["networking_cli_version"], "0.16.19");
    Ok(())
}

#[test]
fn test_offline_versions_as_text() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let settings = dir.path().join("settings.yaml");
    std::fs::write(&settings, "offline: true\n")?;

    provisioner()
        .args(["versions", "-c"])
        .arg(&settings)
        .assert()
        .success()
        .stdout(predicate::str::contains("kubernetes"))
        .stdout(predicate::str::contains("1.31.1"))
        .stdout(predicate::str::contains("pause"));
    Ok(())
}

#[test]
fn test_missing_config_file_fails() {
    provisioner()
        .args(["versions", "--offline", "-c", "/nonexistent/kube-node-provisioner.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_invalid_settings_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let settings = dir.path().join("settings.yaml");
    std::fs::write(&settings, "pod_subnet: 10.200.0.0\n")?;

    provisioner()
        .args(["versions", "--offline", "-c"])
        .arg(&settings)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid settings"));
    Ok(())
}
