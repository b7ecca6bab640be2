//! Host command execution for hostprep.
//!
//! Preflight checks never spawn processes themselves. They go through the
//! `Executor` trait, which runs commands with a stable locale, elevates through
//! `sudo` when root access is needed, and installs root-owned files. The
//! `SystemExecutor` talks to the real host; `MockExecutor` scripts results and
//! records every call for tests.

pub mod mock;
pub mod system;

pub use mock::MockExecutor;
pub use system::{running_as_root, SystemExecutor};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("executor I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait Executor: Send + Sync {
    /// Run `program` with `LC_ALL=C` so its output can be parsed reliably.
    fn run_with_default_locale(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ExecError>;

    /// Run `program` as root. `description` is shown to the user before any
    /// password prompt.
    fn run_with_privilege(
        &self,
        description: &str,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ExecError>;

    /// Atomically install `content` at `path` owned by root with `mode`.
    fn write_to_file_as_root(
        &self,
        description: &str,
        content: &str,
        path: &Path,
        mode: u32,
    ) -> Result<(), ExecError>;

    /// Whether `name` resolves to an executable on `PATH`.
    fn command_exists(&self, name: &str) -> bool;
}

pub(crate) fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_owned()
    } else {
        format!("{program} {}", args.join(" "))
    }
}
