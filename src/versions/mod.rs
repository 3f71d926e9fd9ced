// file: src/versions/mod.rs
// version: 1.0.0
// guid: 4c7e1a90-b2d5-4f38-8e61-0a9d3c5f7b24

//! Target version resolution
//!
//! Each component has a ranked chain of [`ResolutionStrategy`] values. The
//! first strategy that produces a usable version wins; remote strategies are
//! best-effort freshness and the static strategies at the end of every chain
//! are the floor. Only an orchestrator version without a parsable
//! `major.minor` stops the run, since every later step is keyed on it.

pub mod strategies;

pub use strategies::{GithubLatestRelease, KubeadmConstants, PauseTable, StableTxt, StaticDefault};

use crate::config::{FallbackVersions, VersionSet};
use crate::network::MetadataSource;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Something whose version must be known before installing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Component {
    Orchestrator,
    Runtime,
    Shim,
    NetworkingPlugin,
    NetworkingCli,
    SandboxImage,
}

impl Component {
    /// Resolution order; the sandbox image depends on the orchestrator
    pub const ALL: [Component; 6] = [
        Component::Orchestrator,
        Component::Runtime,
        Component::Shim,
        Component::NetworkingPlugin,
        Component::NetworkingCli,
        Component::SandboxImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Orchestrator => "kubernetes",
            Component::Runtime => "containerd",
            Component::Shim => "runc",
            Component::NetworkingPlugin => "cilium",
            Component::NetworkingCli => "cilium-cli",
            Component::SandboxImage => "pause",
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a strategy could not produce a version
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("{strategy} could not reach its source for {component}: {reason}")]
    Unavailable {
        component: Component,
        strategy: String,
        reason: String,
    },

    #[error("{strategy} returned no parsable version for {component}: {detail}")]
    Unparseable {
        component: Component,
        strategy: String,
        detail: String,
    },

    #[error("{strategy} does not handle {component}")]
    Unsupported {
        component: Component,
        strategy: String,
    },

    #[error("{component} needs the orchestrator version, which is not resolved yet")]
    MissingDependency { component: Component },

    #[error("every strategy failed for {0}")]
    Exhausted(Component),

    #[error("could not determine a kubernetes major.minor from '{0}'")]
    OrchestratorUnparseable(String),
}

/// Versions resolved so far, visible to later strategies
pub type Resolved = HashMap<Component, String>;

/// Strategy interface: one way of finding a component's version
#[async_trait::async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(
        &self,
        component: Component,
        resolved: &Resolved,
    ) -> std::result::Result<String, ResolutionError>;
}

/// Ordered strategy chains per component
pub struct VersionResolver {
    chains: Vec<(Component, Vec<Box<dyn ResolutionStrategy>>)>,
}

impl VersionResolver {
    /// Empty resolver; chains are added with [`VersionResolver::chain`]
    pub fn new() -> Self {
        Self { chains: Vec::new() }
    }

    /// Register the strategies for `component`, highest priority first
    pub fn chain(mut self, component: Component, strategies: Vec<Box<dyn ResolutionStrategy>>) -> Self {
        self.chains.push((component, strategies));
        self
    }

    /// Remote-first chains for every component, ending in static tables
    pub fn standard(source: Arc<dyn MetadataSource>, fallback: &FallbackVersions) -> Self {
        let github = |repo: &str| -> Box<dyn ResolutionStrategy> {
            Box::new(GithubLatestRelease::new(repo, source.clone()))
        };

        Self::new()
            .chain(
                Component::Orchestrator,
                vec![github("kubernetes/kubernetes"), Box::new(StaticDefault::new(fallback))],
            )
            .chain(
                Component::Runtime,
                vec![github("containerd/containerd"), Box::new(StaticDefault::new(fallback))],
            )
            .chain(
                Component::Shim,
                vec![github("opencontainers/runc"), Box::new(StaticDefault::new(fallback))],
            )
            .chain(
                Component::NetworkingPlugin,
                vec![github("cilium/cilium"), Box::new(StaticDefault::new(fallback))],
            )
            .chain(
                Component::NetworkingCli,
                vec![
                    Box::new(StableTxt::cilium_cli(source.clone())),
                    Box::new(StaticDefault::new(fallback)),
                ],
            )
            .chain(
                Component::SandboxImage,
                vec![
                    Box::new(KubeadmConstants::release_branch(source.clone())),
                    Box::new(KubeadmConstants::default_branch(source)),
                    Box::new(PauseTable),
                ],
            )
    }

    /// Static chains only, for `--offline` runs
    pub fn offline(fallback: &FallbackVersions) -> Self {
        let mut resolver = Self::new();
        for component in Component::ALL {
            let strategy: Box<dyn ResolutionStrategy> = match component {
                Component::SandboxImage => Box::new(PauseTable),
                _ => Box::new(StaticDefault::new(fallback)),
            };
            resolver = resolver.chain(component, vec![strategy]);
        }
        resolver
    }

    /// Resolve one component by walking its chain
    async fn resolve_component(
        &self,
        component: Component,
        strategies: &[Box<dyn ResolutionStrategy>],
        resolved: &Resolved,
    ) -> std::result::Result<String, ResolutionError> {
        for strategy in strategies {
            match strategy.resolve(component, resolved).await {
                Ok(version) if !version.trim().is_empty() => {
                    info!("Resolved {} {} via {}", component, version, strategy.name());
                    return Ok(version);
                }
                Ok(_) => warn!("{} returned an empty version for {}", strategy.name(), component),
                Err(e) => warn!("{}", e),
            }
        }
        Err(ResolutionError::Exhausted(component))
    }

    /// Resolve every component into a complete [`VersionSet`]
    pub async fn resolve_all(&self) -> std::result::Result<VersionSet, ResolutionError> {
        let mut resolved = Resolved::new();

        for component in Component::ALL {
            let Some((_, strategies)) = self.chains.iter().find(|(c, _)| *c == component) else {
                return Err(ResolutionError::Exhausted(component));
            };

            let version = self.resolve_component(component, strategies, &resolved).await?;

            if component == Component::Orchestrator && major_minor(&version).is_none() {
                return Err(ResolutionError::OrchestratorUnparseable(version));
            }
            resolved.insert(component, version);
        }

        let mut take = |c: Component| resolved.remove(&c).unwrap_or_default();
        let set = VersionSet {
            orchestrator_version: take(Component::Orchestrator),
            runtime_version: take(Component::Runtime),
            shim_version: take(Component::Shim),
            networking_plugin_version: take(Component::NetworkingPlugin),
            networking_cli_version: take(Component::NetworkingCli),
            sandbox_image_version: take(Component::SandboxImage),
        };
        debug!("Resolved version set: {:?}", set);
        Ok(set)
    }
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn release_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+(\.\d+)?$").expect("static regex"))
}

/// Strip a leading `v` and accept only plain release numbers
///
/// Pre-release and build suffixes are rejected so a release candidate tag is
/// never pinned.
pub fn normalize_version(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let candidate = trimmed.strip_prefix('v').unwrap_or(trimmed);
    release_pattern()
        .is_match(candidate)
        .then(|| candidate.to_string())
}

/// `(major, minor)` of a version string such as `1.31.1`, `v1.31` or `1.31`
pub fn major_minor(version: &str) -> Option<(u64, u64)> {
    let normalized = normalize_version(version)?;
    if let Ok(v) = semver::Version::parse(&normalized) {
        return Some((v.major, v.minor));
    }
    let mut parts = normalized.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}
