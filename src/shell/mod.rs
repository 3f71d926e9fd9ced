// file: src/shell/mod.rs
// version: 1.1.0
// guid: b8f3c61e-4d07-4a92-8e15-c7a2d9f04b36

//! kubectl alias and completion lines in the invoking user's shell profile
//!
//! One descriptor table drives both the install-side append and the
//! uninstall-side strip. Presence is checked by substring so a line the user
//! reformatted is still recognised. Removal is stricter: only the block under
//! [`MARKER`] and exact copies of the managed text are dropped, so the user's
//! own alias lines survive an uninstall.

use crate::host::InvokingUser;
use crate::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Comment written above the added lines
pub const MARKER: &str = "# added by kube-node-provisioner";

/// A line to add and the fragment that proves it is already there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileLine {
    pub line: &'static str,
    pub needle: &'static str,
}

/// Per-shell rc file location and syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellProfile {
    pub shell: &'static str,
    /// Relative to the user's home directory
    pub rc_path: &'static str,
    pub alias_line: ProfileLine,
    pub completion_lines: &'static [ProfileLine],
}

const PROFILES: [ShellProfile; 3] = [
    ShellProfile {
        shell: "bash",
        rc_path: ".bashrc",
        alias_line: ProfileLine {
            line: "alias k=kubectl",
            needle: "alias k=",
        },
        completion_lines: &[
            ProfileLine {
                line: "source <(kubectl completion bash)",
                needle: "kubectl completion bash",
            },
            ProfileLine {
                line: "complete -o default -F __start_kubectl k",
                needle: "__start_kubectl k",
            },
            ProfileLine {
                line: "command -v cilium >/dev/null && source <(cilium completion bash)",
                needle: "cilium completion bash",
            },
        ],
    },
    ShellProfile {
        shell: "zsh",
        rc_path: ".zshrc",
        alias_line: ProfileLine {
            line: "alias k=kubectl",
            needle: "alias k=",
        },
        completion_lines: &[
            ProfileLine {
                line: "source <(kubectl completion zsh)",
                needle: "kubectl completion zsh",
            },
            ProfileLine {
                line: "compdef __start_kubectl k",
                needle: "compdef __start_kubectl",
            },
            ProfileLine {
                line: "command -v cilium >/dev/null && source <(cilium completion zsh)",
                needle: "cilium completion zsh",
            },
        ],
    },
    ShellProfile {
        shell: "fish",
        rc_path: ".config/fish/config.fish",
        alias_line: ProfileLine {
            line: "alias k kubectl",
            needle: "alias k ",
        },
        completion_lines: &[
            ProfileLine {
                line: "kubectl completion fish | source",
                needle: "kubectl completion fish",
            },
            ProfileLine {
                line: "command -q cilium; and cilium completion fish | source",
                needle: "cilium completion fish",
            },
        ],
    },
];

/// Profile for a shell name or login shell path; unknown shells get bash
pub fn profile_for(shell: &str) -> &'static ShellProfile {
    let name = Path::new(shell.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    PROFILES
        .iter()
        .find(|p| p.shell == name)
        .unwrap_or(&PROFILES[0])
}

impl ShellProfile {
    /// Every line this profile manages, alias first
    pub fn lines(&self) -> impl Iterator<Item = &ProfileLine> {
        std::iter::once(&self.alias_line).chain(self.completion_lines.iter())
    }

    pub fn rc_file(&self, home: &Path) -> PathBuf {
        home.join(self.rc_path)
    }
}

/// Append missing lines; returns the new content and how many were added
pub fn append_missing(content: &str, profile: &ShellProfile) -> (String, usize) {
    let missing: Vec<&ProfileLine> = profile
        .lines()
        .filter(|l| !content.contains(l.needle))
        .collect();
    if missing.is_empty() {
        return (content.to_string(), 0);
    }

    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !content.contains(MARKER) {
        out.push_str(MARKER);
        out.push('\n');
    }
    for l in &missing {
        out.push_str(l.line);
        out.push('\n');
    }
    (out, missing.len())
}

/// Drop managed lines and the marker; returns the new content and how many went
pub fn strip_managed(content: &str, profile: &ShellProfile) -> (String, usize) {
    let mut removed = 0;
    let mut in_block = false;
    let mut kept = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        let managed = if trimmed == MARKER {
            in_block = true;
            true
        } else if profile.lines().any(|l| trimmed == l.line) {
            true
        } else {
            in_block = in_block && profile.lines().any(|l| line.contains(l.needle));
            in_block
        };
        if managed {
            removed += 1;
        } else {
            kept.push(line);
        }
    }

    if removed == 0 {
        return (content.to_string(), 0);
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    (out, removed)
}

/// Append the alias and completion lines to the user's rc file
pub async fn install(user: &InvokingUser) -> Result<usize> {
    let profile = profile_for(&user.shell);
    let rc = profile.rc_file(&user.home);
    info!("Configuring {} profile {}", profile.shell, rc.display());

    let added = append_to_file(&rc, profile).await?;
    if added == 0 {
        info!("Shell profile already configured");
        return Ok(0);
    }
    if crate::host::facts::is_root() {
        std::os::unix::fs::chown(&rc, Some(user.uid), Some(user.gid))?;
    }
    info!("Added {} line(s) to {}", added, rc.display());
    Ok(added)
}

/// Append missing lines to `rc`, creating it and its parent if needed
pub async fn append_to_file(rc: &Path, profile: &ShellProfile) -> Result<usize> {
    let content = match tokio::fs::read_to_string(rc).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let (updated, added) = append_missing(&content, profile);
    if added > 0 {
        if let Some(parent) = rc.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(rc, updated).await?;
    }
    Ok(added)
}

/// Backup name `{rc}.bak.{YYYYmmdd-HHMMSS}`
pub fn backup_path(rc: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    PathBuf::from(format!("{}.bak.{}", rc.display(), stamp))
}

/// Back up then strip managed lines; `None` when there was nothing to strip
pub async fn strip_with_backup(rc: &Path, profile: &ShellProfile) -> Result<Option<PathBuf>> {
    let content = match tokio::fs::read_to_string(rc).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist", rc.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let (stripped, removed) = strip_managed(&content, profile);
    if removed == 0 {
        return Ok(None);
    }

    let backup = backup_path(rc);
    tokio::fs::copy(rc, &backup).await?;
    tokio::fs::write(rc, stripped).await?;
    info!(
        "Removed {} line(s) from {} (backup {})",
        removed,
        rc.display(),
        backup.display()
    );
    Ok(Some(backup))
}
