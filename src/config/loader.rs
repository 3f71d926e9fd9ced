// file: src/config/loader.rs
// version: 2.0.0
// guid: d4e5f6g7-h8i9-0123-4567-890123defghi

//! Configuration file loading and environment variable substitution

use super::ProvisionConfig;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Load settings from a YAML file, or the defaults when no file is given
    pub fn load_or_default(&self, path: Option<&Path>) -> Result<ProvisionConfig> {
        match path {
            Some(path) => self.load_provision_config(path),
            None => {
                debug!("No config file given, using built-in defaults");
                let config = ProvisionConfig::default();
                config.check()?;
                Ok(config)
            }
        }
    }

    /// Load provisioning settings from a YAML file
    pub fn load_provision_config<P: AsRef<Path>>(&self, path: P) -> Result<ProvisionConfig> {
        let content = fs::read_to_string(&path).map_err(|e| {
            crate::error::ProvisionError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let expanded = self.expand_env_vars(&content)?;
        let mut config: ProvisionConfig = serde_yaml::from_str(&expanded)?;
        Self::expand_home(&mut config);

        config.check()?;

        debug!("Loaded settings from {}", path.as_ref().display());
        Ok(config)
    }

    /// Expand environment variables in configuration content
    fn expand_env_vars(&self, content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| {
            crate::error::ProvisionError::config(format!("Invalid regex pattern: {}", e))
        })?;

        let mut result = content.to_string();
        let mut missing_vars = Vec::new();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];

            if let Some(value) = self.env_vars.get(var_name) {
                result = result.replace(placeholder, value);
            } else {
                missing_vars.push(var_name.to_string());
            }
        }

        if !missing_vars.is_empty() {
            return Err(crate::error::ProvisionError::config(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            )));
        }

        Ok(result)
    }

    /// Resolve `~` in every configured path
    fn expand_home(config: &mut ProvisionConfig) {
        let paths = &mut config.paths;
        for path in [
            &mut paths.hosts_file,
            &mut paths.fstab,
            &mut paths.kubeadm_config,
            &mut paths.init_log,
            &mut paths.sysctl_file,
            &mut paths.modules_file,
            &mut paths.apt_list,
            &mut paths.apt_keyring,
            &mut paths.containerd_config,
            &mut paths.containerd_unit,
            &mut paths.admin_kubeconfig,
            &mut paths.cni_conf_dir,
        ] {
            *path = tilde(path);
        }
        for path in paths.binaries.iter_mut().chain(paths.state_dirs.iter_mut()) {
            *path = tilde(path);
        }
    }

    /// Set environment variable for substitution
    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }
}

fn tilde(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
