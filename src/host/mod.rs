// file: src/host/mod.rs
// version: 1.0.0
// guid: 2b5f8d13-c7a0-49e6-b3d1-8f04e6a9c272

//! Host access: command execution, facts, prompts and file edits

pub mod executor;
pub mod facts;
pub mod hosts_file;
pub mod prompt;

pub use executor::{CommandExecutor, LocalExecutor};
pub use facts::InvokingUser;
pub use hosts_file::HostsFile;
pub use prompt::{Prompter, ScriptedPrompter, TerminalPrompter};
