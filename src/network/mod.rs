// file: src/network/mod.rs
// version: 2.0.0
// guid: s9t0u1v2-w3x4-5678-9012-345678stuvwx

//! Network operations module

pub mod checksum;
pub mod download;

pub use download::NetworkDownloader;

use crate::Result;
use std::path::Path;

/// Read-only text endpoint: release APIs and raw source files
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Fetches release artifacts to local files
#[async_trait::async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// In-memory sources for unit tests
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Answers URLs containing a needle with the stored body, everything else fails
    #[derive(Default)]
    pub struct FakeSource {
        pub bodies: Vec<(String, String)>,
    }

    impl FakeSource {
        pub fn with(mut self, needle: &str, body: &str) -> Self {
            self.bodies.push((needle.to_string(), body.to_string()));
            self
        }
    }

    #[async_trait::async_trait]
    impl MetadataSource for FakeSource {
        async fn fetch_text(&self, url: &str) -> Result<String> {
            self.bodies
                .iter()
                .find(|(needle, _)| url.contains(needle.as_str()))
                .map(|(_, body)| body.clone())
                .ok_or_else(|| crate::error::ProvisionError::network(format!("unreachable: {}", url)))
        }
    }

    /// Writes canned bytes for matching URLs and a placeholder otherwise
    #[derive(Default)]
    pub struct FakeDownloader {
        pub files: Vec<(String, Vec<u8>)>,
        pub requested: Mutex<Vec<String>>,
    }

    impl FakeDownloader {
        pub fn with(mut self, needle: &str, body: &[u8]) -> Self {
            self.files.push((needle.to_string(), body.to_vec()));
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl Downloader for FakeDownloader {
        async fn download(&self, url: &str, dest: &Path) -> Result<()> {
            if let Ok(mut requested) = self.requested.lock() {
                requested.push(url.to_string());
            }
            let body = self
                .files
                .iter()
                .rev()
                .find(|(needle, _)| url.contains(needle.as_str()))
                .map(|(_, body)| body.clone())
                .unwrap_or_else(|| b"artifact".to_vec());
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(dest, body).await?;
            Ok(())
        }
    }
}
