// file: src/network/download.rs
// version: 2.0.0
// guid: u1v2w3x4-y5z6-7890-1234-567890uvwxyz

//! Network download utilities

use super::{Downloader, MetadataSource};
use crate::Result;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Timeout for small metadata requests
const METADATA_TIMEOUT: Duration = Duration::from_secs(15);

/// Network downloader with progress tracking
pub struct NetworkDownloader {
    client: reqwest::Client,
}

impl NetworkDownloader {
    /// Create a new network downloader
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    /// Download file with progress bar
    pub async fn download_with_progress<P: AsRef<Path>>(&self, url: &str, dest: P) -> Result<()> {
        info!("Downloading: {}", url);

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(crate::error::ProvisionError::network(format!(
                "Download of {} failed with status: {}",
                url,
                response.status()
            )));
        }

        let total_size = response.content_length().unwrap_or(0);

        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        let mut file = File::create(&dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush().await?;
        pb.finish_with_message("Download completed");

        info!("Downloaded to: {}", dest.as_ref().display());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Downloader for NetworkDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.download_with_progress(url, dest).await
    }
}

#[async_trait::async_trait]
impl MetadataSource for NetworkDownloader {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        debug!("Fetching metadata: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(METADATA_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(crate::error::ProvisionError::network(format!(
                "GET {} returned status {}",
                url,
                response.status()
            )));
        }

        Ok(response.text().await?)
    }
}
