// file: src/host/hosts_file.rs
// version: 1.0.0
// guid: a8c31f64-5b90-4d27-9e1a-3f72b6d0c815

//! Idempotent edits to the host's name-resolution table

use crate::config::HostRegistrationEntry;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Strip `names` from every mapping line, dropping lines left without names
///
/// Comments and blank lines pass through untouched. Returns the new content
/// and whether anything changed.
pub fn remove_names(content: &str, names: &[&str]) -> (String, bool) {
    let mut changed = false;
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
        let (body, comment) = match line.find('#') {
            Some(idx) => (&line[..idx], Some(&line[idx..])),
            None => (line, None),
        };

        let mut tokens = body.split_whitespace();
        let Some(ip) = tokens.next() else {
            out.push_str(line);
            out.push('\n');
            continue;
        };

        let all: Vec<&str> = tokens.collect();
        let kept: Vec<&str> = all.iter().copied().filter(|n| !names.contains(n)).collect();

        if kept.len() == all.len() {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        changed = true;
        if kept.is_empty() {
            continue;
        }

        out.push_str(ip);
        out.push(' ');
        out.push_str(&kept.join(" "));
        if let Some(comment) = comment {
            out.push(' ');
            out.push_str(comment);
        }
        out.push('\n');
    }

    (out, changed)
}

/// Remove prior mappings for each entry's name, then append the entries
pub fn upsert_entries(content: &str, entries: &[HostRegistrationEntry]) -> String {
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    let (mut out, _) = remove_names(content, &names);

    for entry in entries {
        out.push_str(&entry.to_line());
        out.push('\n');
    }
    out
}

/// Number of mapping lines that carry `name`
pub fn count_mappings(content: &str, name: &str) -> usize {
    content
        .lines()
        .map(|l| l.split('#').next().unwrap_or(""))
        .filter(|body| body.split_whitespace().skip(1).any(|n| n == name))
        .count()
}

/// A hosts file on disk
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `entries`, replacing any earlier mapping of the same names
    pub async fn upsert(&self, entries: &[HostRegistrationEntry]) -> Result<()> {
        let current = self.read().await?;
        let updated = upsert_entries(&current, entries);
        tokio::fs::write(&self.path, updated).await?;
        for entry in entries {
            info!("Registered {} in {}", entry.to_line(), self.path.display());
        }
        Ok(())
    }

    /// Drop mappings of `name`; returns whether the file changed
    pub async fn remove_name(&self, name: &str) -> Result<bool> {
        let current = self.read().await?;
        let (updated, changed) = remove_names(&current, &[name]);
        if changed {
            tokio::fs::write(&self.path, updated).await?;
            debug!("Removed {} from {}", name, self.path.display());
        }
        Ok(changed)
    }

    /// Whether `name` is currently mapped
    pub async fn contains(&self, name: &str) -> Result<bool> {
        Ok(count_mappings(&self.read().await?, name) > 0)
    }

    /// Path of the backup copy kept by teardown
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".k8s-backup");
        PathBuf::from(name)
    }

    /// Copy the current file to its backup location
    pub async fn backup(&self) -> Result<PathBuf> {
        let backup = self.backup_path();
        tokio::fs::copy(&self.path, &backup).await?;
        Ok(backup)
    }

    /// Replace the file with its backup and remove the backup
    pub async fn restore_backup(&self) -> Result<()> {
        let backup = self.backup_path();
        tokio::fs::copy(&backup, &self.path).await?;
        tokio::fs::remove_file(&backup).await?;
        Ok(())
    }
}
