// file: src/network/checksum.rs
// version: 1.0.0
// guid: f2a6c9d4-0e31-47b8-a5c2-9d18e7b04f63

//! SHA-256 verification of downloaded artifacts

use crate::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Calculate the hex SHA-256 of a file
pub async fn sha256_file(path: &Path) -> Result<String> {
    let content = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

/// Extract the digest from a `sha256sum` output line (`<digest>  <file>`)
pub fn parse_sha256sum(line: &str) -> Option<String> {
    let digest = line.split_whitespace().next()?;
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_ascii_lowercase())
    } else {
        None
    }
}

/// Compare a file against an expected digest
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(crate::error::ProvisionError::ChecksumMismatch {
            file: path.display().to_string(),
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // sha256("hello\n")
    const HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn test_parse_sha256sum_line() {
        let line = format!("{}  cilium-linux-amd64.tar.gz\n", HELLO);
        assert_eq!(parse_sha256sum(&line).as_deref(), Some(HELLO));
        assert_eq!(parse_sha256sum("not-a-digest file"), None);
        assert_eq!(parse_sha256sum(""), None);
    }

    #[tokio::test]
    async fn test_verify_sha256_match_and_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact");
        tokio::fs::write(&path, "hello\n").await.unwrap();

        assert!(verify_sha256(&path, HELLO).await.is_ok());

        let wrong = "0".repeat(64);
        match verify_sha256(&path, &wrong).await {
            Err(crate::error::ProvisionError::ChecksumMismatch { expected, actual, .. }) => {
                assert_eq!(expected, wrong);
                assert_eq!(actual, HELLO);
            }
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }
}
