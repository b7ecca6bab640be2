use crate::{command_line, CommandOutput, ExecError, Executor};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A file installed through `write_to_file_as_root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub content: String,
    pub mode: u32,
}

type Reply = Result<String, String>;

#[derive(Default)]
struct MockState {
    queued: HashMap<String, VecDeque<Reply>>,
    sticky: HashMap<String, Reply>,
    missing: HashSet<String>,
    calls: Vec<String>,
    written: Vec<WrittenFile>,
}

/// Scripted executor for tests.
///
/// Replies are keyed by program name. Queued replies are consumed in order;
/// once a program's queue is empty its sticky reply (if any) is returned, and
/// otherwise the call succeeds with empty output. Every invocation is recorded,
/// privileged ones prefixed with `sudo `.
#[derive(Default)]
pub struct MockExecutor {
    state: Mutex<MockState>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a successful reply for the next call of `program`.
    pub fn push_ok(&self, program: &str, stdout: &str) -> &Self {
        self.state()
            .queued
            .entry(program.to_owned())
            .or_default()
            .push_back(Ok(stdout.to_owned()));
        self
    }

    /// Queue a failing reply for the next call of `program`.
    pub fn push_failure(&self, program: &str, stderr: &str) -> &Self {
        self.state()
            .queued
            .entry(program.to_owned())
            .or_default()
            .push_back(Err(stderr.to_owned()));
        self
    }

    /// Make every unqueued call of `program` fail.
    pub fn always_fail(&self, program: &str, stderr: &str) -> &Self {
        self.state()
            .sticky
            .insert(program.to_owned(), Err(stderr.to_owned()));
        self
    }

    pub fn without_command(&self, name: &str) -> &Self {
        self.state().missing.insert(name.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn called(&self, program: &str) -> bool {
        self.state().calls.iter().any(|c| {
            let c = c.strip_prefix("sudo ").unwrap_or(c);
            c == program || c.starts_with(&format!("{program} "))
        })
    }

    pub fn written_files(&self) -> Vec<WrittenFile> {
        self.state().written.clone()
    }

    fn reply(&self, program: &str, line: String) -> Result<CommandOutput, ExecError> {
        let mut state = self.state();
        state.calls.push(line.clone());
        let queued = state.queued.get_mut(program).and_then(VecDeque::pop_front);
        let reply = match queued {
            Some(reply) => reply,
            None => state
                .sticky
                .get(program)
                .cloned()
                .unwrap_or_else(|| Ok(String::new())),
        };
        match reply {
            Ok(stdout) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Err(stderr) => Err(ExecError::Failed {
                command: line,
                status: "exit status 1".to_owned(),
                stderr,
            }),
        }
    }
}

impl Executor for MockExecutor {
    fn run_with_default_locale(
        &self,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ExecError> {
        self.reply(program, command_line(program, args))
    }

    fn run_with_privilege(
        &self,
        _description: &str,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ExecError> {
        self.reply(program, format!("sudo {}", command_line(program, args)))
    }

    fn write_to_file_as_root(
        &self,
        _description: &str,
        content: &str,
        path: &Path,
        mode: u32,
    ) -> Result<(), ExecError> {
        let mut state = self.state();
        state
            .calls
            .push(format!("sudo install {}", path.display()));
        state.written.push(WrittenFile {
            path: path.to_path_buf(),
            content: content.to_owned(),
            mode,
        });
        Ok(())
    }

    fn command_exists(&self, name: &str) -> bool {
        !self.state().missing.contains(name)
    }
}
