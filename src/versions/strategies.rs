// file: src/versions/strategies.rs
// version: 1.0.0
// guid: 9e2d4b17-63a8-4c0f-b5e9-71f8a2c6d305

//! Concrete resolution strategies

use super::{major_minor, normalize_version, Component, Resolved, ResolutionError, ResolutionStrategy};
use crate::config::FallbackVersions;
use crate::network::MetadataSource;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    tag_name: String,
}

/// Latest release tag of a GitHub repository
pub struct GithubLatestRelease {
    name: String,
    repo: String,
    source: Arc<dyn MetadataSource>,
}

impl GithubLatestRelease {
    pub fn new(repo: &str, source: Arc<dyn MetadataSource>) -> Self {
        Self {
            name: format!("github-latest({})", repo),
            repo: repo.to_string(),
            source,
        }
    }

    fn url(&self) -> String {
        format!("https://api.github.com/repos/{}/releases/latest", self.repo)
    }
}

#[async_trait::async_trait]
impl ResolutionStrategy for GithubLatestRelease {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, component: Component, _resolved: &Resolved) -> Result<String, ResolutionError> {
        let body = self
            .source
            .fetch_text(&self.url())
            .await
            .map_err(|e| ResolutionError::Unavailable {
                component,
                strategy: self.name.clone(),
                reason: e.to_string(),
            })?;

        let release: ReleaseInfo = serde_json::from_str(&body).map_err(|e| ResolutionError::Unparseable {
            component,
            strategy: self.name.clone(),
            detail: e.to_string(),
        })?;

        normalize_version(&release.tag_name).ok_or_else(|| ResolutionError::Unparseable {
            component,
            strategy: self.name.clone(),
            detail: format!("tag '{}'", release.tag_name),
        })
    }
}

/// A plain-text file holding a single version tag
pub struct StableTxt {
    name: String,
    url: String,
    source: Arc<dyn MetadataSource>,
}

impl StableTxt {
    pub fn new(name: &str, url: &str, source: Arc<dyn MetadataSource>) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            source,
        }
    }

    /// The cilium CLI's published stable marker
    pub fn cilium_cli(source: Arc<dyn MetadataSource>) -> Self {
        Self::new(
            "cilium-cli-stable.txt",
            "https://raw.githubusercontent.com/cilium/cilium-cli/main/stable.txt",
            source,
        )
    }
}

#[async_trait::async_trait]
impl ResolutionStrategy for StableTxt {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, component: Component, _resolved: &Resolved) -> Result<String, ResolutionError> {
        let body = self
            .source
            .fetch_text(&self.url)
            .await
            .map_err(|e| ResolutionError::Unavailable {
                component,
                strategy: self.name.clone(),
                reason: e.to_string(),
            })?;

        let first = body.lines().next().unwrap_or_default();
        normalize_version(first).ok_or_else(|| ResolutionError::Unparseable {
            component,
            strategy: self.name.clone(),
            detail: format!("content '{}'", first.trim()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Release,
    Default,
}

/// The sandbox image pinned in kubeadm's constants source file
pub struct KubeadmConstants {
    branch: Branch,
    name: String,
    source: Arc<dyn MetadataSource>,
}

impl KubeadmConstants {
    /// Read from `release-{major}.{minor}` of the resolved orchestrator
    pub fn release_branch(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            branch: Branch::Release,
            name: "kubeadm-constants(release)".to_string(),
            source,
        }
    }

    /// Read from the repository's default branch
    pub fn default_branch(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            branch: Branch::Default,
            name: "kubeadm-constants(master)".to_string(),
            source,
        }
    }

    fn url(&self, resolved: &Resolved) -> Option<String> {
        let git_ref = match self.branch {
            Branch::Release => {
                let (major, minor) = major_minor(resolved.get(&Component::Orchestrator)?)?;
                format!("release-{}.{}", major, minor)
            }
            Branch::Default => "master".to_string(),
        };
        Some(format!(
            "https://raw.githubusercontent.com/kubernetes/kubernetes/{}/cmd/kubeadm/app/constants/constants.go",
            git_ref
        ))
    }
}

fn pause_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"PauseVersion\s*=\s*"([0-9][0-9.]*)""#).expect("static regex"))
}

/// Pull the `PauseVersion` constant out of kubeadm's Go source
pub fn extract_pause_version(source: &str) -> Option<String> {
    pause_pattern()
        .captures(source)
        .and_then(|caps| normalize_version(&caps[1]))
}

#[async_trait::async_trait]
impl ResolutionStrategy for KubeadmConstants {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, component: Component, resolved: &Resolved) -> Result<String, ResolutionError> {
        if component != Component::SandboxImage {
            return Err(ResolutionError::Unsupported {
                component,
                strategy: self.name.clone(),
            });
        }
        let url = self
            .url(resolved)
            .ok_or(ResolutionError::MissingDependency { component })?;
        debug!("Looking up pause version in {}", url);

        let body = self
            .source
            .fetch_text(&url)
            .await
            .map_err(|e| ResolutionError::Unavailable {
                component,
                strategy: self.name.clone(),
                reason: e.to_string(),
            })?;

        extract_pause_version(&body).ok_or_else(|| ResolutionError::Unparseable {
            component,
            strategy: self.name.clone(),
            detail: "no PauseVersion constant".to_string(),
        })
    }
}

/// Configured fallback versions
pub struct StaticDefault {
    fallback: FallbackVersions,
}

impl StaticDefault {
    pub fn new(fallback: &FallbackVersions) -> Self {
        Self {
            fallback: fallback.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ResolutionStrategy for StaticDefault {
    fn name(&self) -> &str {
        "static-default"
    }

    async fn resolve(&self, component: Component, _resolved: &Resolved) -> Result<String, ResolutionError> {
        let value = match component {
            Component::Orchestrator => &self.fallback.kubernetes,
            Component::Runtime => &self.fallback.containerd,
            Component::Shim => &self.fallback.runc,
            Component::NetworkingPlugin => &self.fallback.cilium,
            Component::NetworkingCli => &self.fallback.cilium_cli,
            Component::SandboxImage => {
                return Err(ResolutionError::Unsupported {
                    component,
                    strategy: self.name().to_string(),
                })
            }
        };
        let trimmed = value.trim();
        Ok(trimmed.strip_prefix('v').unwrap_or(trimmed).to_string())
    }
}

/// Sandbox image for an orchestrator minor version
///
/// Returns the version and whether the minor fell outside the known range.
pub fn pause_for_minor(minor: u64) -> (&'static str, bool) {
    match minor {
        31..=33 => ("3.10", false),
        26..=30 => ("3.9", false),
        25 => ("3.8", false),
        24 => ("3.7", false),
        23 => ("3.6", false),
        _ => ("3.10", true),
    }
}

/// Last-resort sandbox image lookup keyed by orchestrator minor
pub struct PauseTable;

#[async_trait::async_trait]
impl ResolutionStrategy for PauseTable {
    fn name(&self) -> &str {
        "pause-table"
    }

    async fn resolve(&self, component: Component, resolved: &Resolved) -> Result<String, ResolutionError> {
        if component != Component::SandboxImage {
            return Err(ResolutionError::Unsupported {
                component,
                strategy: self.name().to_string(),
            });
        }
        let orchestrator = resolved
            .get(&Component::Orchestrator)
            .ok_or(ResolutionError::MissingDependency { component })?;
        let (_, minor) = major_minor(orchestrator)
            .ok_or_else(|| ResolutionError::OrchestratorUnparseable(orchestrator.clone()))?;

        let (pause, unknown) = pause_for_minor(minor);
        if unknown {
            warn!(
                "No pause mapping for kubernetes minor {}; assuming {}. Check kubeadm's constants for this release",
                minor, pause
            );
        }
        Ok(pause.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::network::fake::FakeSource;
    use super::*;

    fn resolved_with(version: &str) -> Resolved {
        let mut r = Resolved::new();
        r.insert(Component::Orchestrator, version.to_string());
        r
    }

    #[test]
    fn test_pause_table() {
        assert_eq!(pause_for_minor(31), ("3.10", false));
        assert_eq!(pause_for_minor(30), ("3.9", false));
        assert_eq!(pause_for_minor(26), ("3.9", false));
        assert_eq!(pause_for_minor(25), ("3.8", false));
        assert_eq!(pause_for_minor(24), ("3.7", false));
        assert_eq!(pause_for_minor(23), ("3.6", false));
        assert_eq!(pause_for_minor(22), ("3.10", true));
        assert_eq!(pause_for_minor(40), ("3.10", true));
    }

    #[test]
    fn test_extract_pause_version() {
        let go = "const (\n\t// PauseVersion indicates the default pause image version\n\tPauseVersion = \"3.10\"\n)";
        assert_eq!(extract_pause_version(go).as_deref(), Some("3.10"));
        assert_eq!(extract_pause_version("PauseVersion = version"), None);
    }

    #[tokio::test]
    async fn test_github_strips_leading_v() {
        let source = Arc::new(FakeSource::default().with("repos/containerd", r#"{"tag_name":"v1.7.23"}"#));
        let strategy = GithubLatestRelease::new("containerd/containerd", source);
        let version = strategy.resolve(Component::Runtime, &Resolved::new()).await.unwrap();
        assert_eq!(version, "1.7.23");
    }

    #[tokio::test]
    async fn test_github_unreachable_is_unavailable() {
        let strategy = GithubLatestRelease::new("cilium/cilium", Arc::new(FakeSource::default()));
        let err = strategy
            .resolve(Component::NetworkingPlugin, &Resolved::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_stable_txt_reads_first_line() {
        let source = Arc::new(FakeSource::default().with("stable.txt", "v0.16.19\n"));
        let version = StableTxt::cilium_cli(source)
            .resolve(Component::NetworkingCli, &Resolved::new())
            .await
            .unwrap();
        assert_eq!(version, "0.16.19");
    }

    #[tokio::test]
    async fn test_release_branch_needs_orchestrator() {
        let strategy = KubeadmConstants::release_branch(Arc::new(FakeSource::default()));
        let err = strategy
            .resolve(Component::SandboxImage, &Resolved::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MissingDependency { .. }));
    }

    #[tokio::test]
    async fn test_release_branch_url_uses_minor() {
        let source = Arc::new(FakeSource::default().with("release-1.29/", "PauseVersion = \"3.9\""));
        let version = KubeadmConstants::release_branch(source)
            .resolve(Component::SandboxImage, &resolved_with("1.29.8"))
            .await
            .unwrap();
        assert_eq!(version, "3.9");
    }

    #[tokio::test]
    async fn test_static_default_covers_everything_but_pause() {
        let strategy = StaticDefault::new(&FallbackVersions::default());
        let resolved = Resolved::new();
        assert_eq!(
            strategy.resolve(Component::Orchestrator, &resolved).await.unwrap(),
            FallbackVersions::default().kubernetes
        );
        assert!(strategy.resolve(Component::SandboxImage, &resolved).await.is_err());
    }

    #[tokio::test]
    async fn test_pause_table_strategy() {
        let version = PauseTable
            .resolve(Component::SandboxImage, &resolved_with("1.24.17"))
            .await
            .unwrap();
        assert_eq!(version, "3.7");
    }
}
