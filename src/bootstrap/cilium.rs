// file: src/bootstrap/cilium.rs
// version: 1.0.0
// guid: e41c7a08-95d3-4b6e-8f20-3a6db9c17e52

//! Checksum-verified cilium CLI installation

use crate::config::Architecture;
use crate::error::ProvisionError;
use crate::host::CommandExecutor;
use crate::network::{checksum, Downloader};
use crate::Result;
use std::path::Path;
use tracing::{error, info};

/// Directory the CLI binary is extracted into
pub const CLI_DIR: &str = "/usr/local/bin";

pub fn cli_tarball(arch: Architecture) -> String {
    format!("cilium-linux-{}.tar.gz", arch.as_str())
}

pub fn cli_url(version: &str, arch: Architecture) -> String {
    format!(
        "https://github.com/cilium/cilium-cli/releases/download/v{}/{}",
        version,
        cli_tarball(arch)
    )
}

/// Download, verify and extract the CLI
///
/// On a digest mismatch the tarball is deleted and the error carries both
/// digests.
pub async fn install_cli<E: CommandExecutor>(
    executor: &mut E,
    downloader: &dyn Downloader,
    version: &str,
    arch: Architecture,
    work_dir: &Path,
) -> Result<()> {
    let url = cli_url(version, arch);
    let tarball = work_dir.join(cli_tarball(arch));
    let digest_file = work_dir.join(format!("{}.sha256sum", cli_tarball(arch)));

    info!("Downloading cilium CLI {}", version);
    downloader.download(&url, &tarball).await?;
    downloader
        .download(&format!("{}.sha256sum", url), &digest_file)
        .await?;

    let listing = tokio::fs::read_to_string(&digest_file).await?;
    let expected = checksum::parse_sha256sum(&listing).ok_or_else(|| {
        ProvisionError::validation(format!(
            "{} does not contain a SHA-256 digest",
            digest_file.display()
        ))
    })?;

    if let Err(e) = checksum::verify_sha256(&tarball, &expected).await {
        error!("cilium CLI download failed verification: {}", e);
        let _ = tokio::fs::remove_file(&tarball).await;
        return Err(e);
    }
    info!("cilium CLI checksum verified");

    executor
        .execute(&format!("tar xzf {} -C {}", tarball.display(), CLI_DIR))
        .await?;
    tokio::fs::remove_file(&tarball).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::executor::fake::FakeExecutor;
    use crate::network::fake::FakeDownloader;
    use tempfile::TempDir;

    // sha256("hello\n")
    const HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn test_cli_url() {
        assert_eq!(
            cli_url("0.16.19", Architecture::Amd64),
            "https://github.com/cilium/cilium-cli/releases/download/v0.16.19/cilium-linux-amd64.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_verified_download_is_extracted() {
        let dir = TempDir::new().unwrap();
        let mut exec = FakeExecutor::new();
        let downloader = FakeDownloader::default()
            .with(".tar.gz", b"hello\n")
            .with(".sha256sum", format!("{}  cilium-linux-amd64.tar.gz\n", HELLO).as_bytes());

        install_cli(&mut exec, &downloader, "0.16.19", Architecture::Amd64, dir.path())
            .await
            .unwrap();

        assert!(exec.ran("tar xzf"));
        assert!(exec.ran("-C /usr/local/bin"));
        assert_eq!(downloader.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_mismatch_removes_download_and_reports_digests() {
        let dir = TempDir::new().unwrap();
        let mut exec = FakeExecutor::new();
        let wrong = "f".repeat(64);
        let downloader = FakeDownloader::default()
            .with(".tar.gz", b"tampered\n")
            .with(".sha256sum", format!("{}  cilium-linux-amd64.tar.gz\n", wrong).as_bytes());

        let err = install_cli(&mut exec, &downloader, "0.16.19", Architecture::Amd64, dir.path())
            .await
            .unwrap_err();

        match err {
            ProvisionError::ChecksumMismatch { expected, actual, .. } => {
                assert_eq!(expected, wrong);
                assert_eq!(actual.len(), 64);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!dir.path().join("cilium-linux-amd64.tar.gz").exists());
        assert!(exec.commands.is_empty());
    }
}
