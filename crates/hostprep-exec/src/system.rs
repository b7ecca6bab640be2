use crate::{command_line, CommandOutput, ExecError, Executor};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Elevation helper for privileged commands when not already root.
const ELEVATION_HELPER: &str = "sudo";

/// Executor backed by real processes on the host.
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }

    fn spawn(
        &self,
        program: &str,
        args: &[&str],
        privileged: bool,
    ) -> Result<CommandOutput, ExecError> {
        let mut cmd = if privileged && !running_as_root() {
            let mut c = Command::new(ELEVATION_HELPER);
            c.arg(program);
            c
        } else {
            Command::new(program)
        };
        cmd.args(args).env("LC_ALL", "C").env("LANG", "C");

        let line = command_line(program, args);
        debug!("running: {line}");
        let output = cmd.output().map_err(|source| ExecError::Spawn {
            command: line.clone(),
            source,
        })?;
        into_result(line, &output)
    }
}

fn into_result(command: String, output: &Output) -> Result<CommandOutput, ExecError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if output.status.success() {
        return Ok(CommandOutput { stdout, stderr });
    }
    let status = output
        .status
        .code()
        .map_or_else(|| "terminated by signal".to_owned(), |c| format!("exit status {c}"));
    Err(ExecError::Failed {
        command,
        status,
        stderr: stderr.trim().to_owned(),
    })
}

impl Executor for SystemExecutor {
    fn run_with_default_locale(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ExecError> {
        self.spawn(program, args, false)
    }

    fn run_with_privilege(
        &self,
        description: &str,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ExecError> {
        if !running_as_root() {
            info!("will use root access: {description}");
        }
        self.spawn(program, args, true)
    }

    fn write_to_file_as_root(
        &self,
        description: &str,
        content: &str,
        path: &Path,
        mode: u32,
    ) -> Result<(), ExecError> {
        // Stage the content unprivileged, then let `install` place it with the
        // right owner and mode in one step.
        let mut staged = NamedTempFile::new()?;
        staged.write_all(content.as_bytes())?;
        staged.as_file().sync_all()?;

        let staged_path = staged.path().to_string_lossy().into_owned();
        let target = path.to_string_lossy().into_owned();
        let mode = format!("{mode:o}");
        self.run_with_privilege(
            description,
            "install",
            &["-D", "-m", &mode, &staged_path, &target],
        )?;
        Ok(())
    }

    fn command_exists(&self, name: &str) -> bool {
        find_in_path(name).is_some()
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| {
            candidate
                .metadata()
                .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        })
}

/// Whether the current process already has an effective uid of 0.
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    #[allow(unsafe_code)]
    let euid = unsafe { libc::geteuid() };
    euid == 0
}
