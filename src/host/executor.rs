// file: src/host/executor.rs
// version: 2.0.0
// guid: exec0001-2345-6789-abcd-ef0123456789

//! Command execution seam between the provisioning steps and the host

use crate::Result;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Trait for running shell commands against the host being provisioned
#[async_trait::async_trait]
pub trait CommandExecutor: Send {
    /// Execute command, failing on non-zero exit
    async fn execute(&mut self, command: &str) -> Result<()>;

    /// Execute command and return stdout, failing on non-zero exit
    async fn execute_with_output(&mut self, command: &str) -> Result<String>;

    /// Execute command and hand back exit code, stdout and stderr without failing
    async fn execute_with_error_collection(
        &mut self,
        command: &str,
        description: &str,
    ) -> Result<(i32, String, String)>;

    /// Execute a command intended as a boolean check without emitting error logs
    async fn check_silent(&mut self, command: &str) -> Result<bool>;

    /// Whether a program is on PATH
    async fn command_exists(&mut self, program: &str) -> bool;
}

/// Executes commands on the local machine through `bash -c`
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }

    async fn run(command: &str) -> Result<std::process::Output> {
        Command::new("bash")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| crate::error::ProvisionError::Process {
                command: command.to_string(),
                exit_code: None,
                stderr: format!("Failed to execute command: {}", e),
            })
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CommandExecutor for LocalExecutor {
    async fn execute(&mut self, command: &str) -> Result<()> {
        self.execute_with_output(command).await.map(|_| ())
    }

    async fn execute_with_output(&mut self, command: &str) -> Result<String> {
        debug!("Executing local command: {}", command);

        let output = Self::run(command).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let exit_code = output.status.code();
            error!("Command failed with exit code {:?}: {}", exit_code, command);
            if !stdout.trim().is_empty() {
                error!("STDOUT: {}", stdout.trim_end());
            }
            if !stderr.trim().is_empty() {
                error!("STDERR: {}", stderr.trim_end());
            }

            return Err(crate::error::ProvisionError::Process {
                command: command.to_string(),
                exit_code,
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            });
        }

        debug!("Command executed successfully ({} bytes of output)", stdout.len());
        Ok(stdout)
    }

    async fn execute_with_error_collection(
        &mut self,
        command: &str,
        description: &str,
    ) -> Result<(i32, String, String)> {
        info!("Executing: {} -> {}", description, command);

        let output = Self::run(command).await?;
        let exit_status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if exit_status != 0 {
            error!("Command '{}' failed with exit code {}", description, exit_status);
            error!("STDERR: {}", stderr.trim_end());
        } else {
            debug!("Command '{}' completed successfully", description);
        }

        Ok((exit_status, stdout, stderr))
    }

    async fn check_silent(&mut self, command: &str) -> Result<bool> {
        let output = Self::run(command).await?;
        Ok(output.status.success())
    }

    async fn command_exists(&mut self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Scripted executor for unit tests
///
/// Every command succeeds with empty output unless a rule whose needle is a
/// substring of the command says otherwise. Rules are checked newest first.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    pub struct FakeExecutor {
        pub commands: Vec<String>,
        rules: Vec<(String, i32, String)>,
        programs: HashSet<String>,
    }

    impl FakeExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&mut self, needle: &str, exit_code: i32, stdout: &str) -> &mut Self {
            self.rules.push((needle.to_string(), exit_code, stdout.to_string()));
            self
        }

        pub fn with_program(&mut self, program: &str) -> &mut Self {
            self.programs.insert(program.to_string());
            self
        }

        pub fn ran(&self, needle: &str) -> bool {
            self.commands.iter().any(|c| c.contains(needle))
        }

        pub fn position(&self, needle: &str) -> Option<usize> {
            self.commands.iter().position(|c| c.contains(needle))
        }

        fn outcome(&mut self, command: &str) -> (i32, String) {
            self.commands.push(command.to_string());
            self.rules
                .iter()
                .rev()
                .find(|(needle, _, _)| command.contains(needle.as_str()))
                .map(|(_, code, out)| (*code, out.clone()))
                .unwrap_or((0, String::new()))
        }
    }

    #[async_trait::async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn execute(&mut self, command: &str) -> Result<()> {
            self.execute_with_output(command).await.map(|_| ())
        }

        async fn execute_with_output(&mut self, command: &str) -> Result<String> {
            let (code, out) = self.outcome(command);
            if code == 0 {
                Ok(out)
            } else {
                Err(crate::error::ProvisionError::Process {
                    command: command.to_string(),
                    exit_code: Some(code),
                    stderr: out,
                })
            }
        }

        async fn execute_with_error_collection(
            &mut self,
            command: &str,
            _description: &str,
        ) -> Result<(i32, String, String)> {
            let (code, out) = self.outcome(command);
            Ok((code, out, String::new()))
        }

        async fn check_silent(&mut self, command: &str) -> Result<bool> {
            Ok(self.outcome(command).0 == 0)
        }

        async fn command_exists(&mut self, program: &str) -> bool {
            self.programs.contains(program)
        }
    }
}
