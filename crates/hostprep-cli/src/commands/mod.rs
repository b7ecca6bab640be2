pub mod check;
pub mod checks;
pub mod cleanup;
pub mod setup;

use hostprep_exec::SystemExecutor;
use hostprep_preflight::runner::{self, NoProgress, Progress, Purpose, RunEvent};
use hostprep_preflight::{
    detect_context, CheckContext, CheckSet, DistroContext, NetworkMode, PreflightConfig,
    PreflightError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_PREFLIGHT_FAILED: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, "✓", msg);
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, "✗", msg);
}

pub fn spin_skip(pb: &ProgressBar, msg: &str) {
    finish(pb, "-", msg);
}

fn finish(pb: &ProgressBar, icon: &str, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("{icon} {msg}"));
}

/// Everything a command needs: resolved settings, the detected host, and
/// the executor that talks to it.
pub struct Session {
    pub config: PreflightConfig,
    pub distro: DistroContext,
    executor: SystemExecutor,
}

impl Session {
    pub fn load(config_path: Option<&Path>, mode: Option<NetworkMode>) -> Result<Self, String> {
        let mut config = PreflightConfig::resolve(config_path).map_err(|e| e.to_string())?;
        if let Some(mode) = mode {
            config.network_mode = mode;
        }
        let distro = detect_context();
        debug!(
            "host {} ({} network mode)",
            distro.display_name(),
            config.network_mode
        );
        Ok(Self {
            config,
            distro,
            executor: SystemExecutor::new(),
        })
    }

    pub fn mode(&self) -> NetworkMode {
        self.config.network_mode
    }

    pub fn context(&self) -> CheckContext<'_> {
        CheckContext {
            executor: &self.executor,
            distro: &self.distro,
            config: &self.config,
        }
    }
}

/// Renders runner events as one spinner line per step.
#[derive(Default)]
pub struct SpinnerProgress {
    current: RefCell<Option<ProgressBar>>,
}

impl SpinnerProgress {
    fn start(&self, msg: &str) {
        if let Some(pb) = self.current.replace(Some(spinner(msg))) {
            pb.abandon();
        }
    }

    fn end(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(pb) = self.current.borrow_mut().take() {
            f(&pb);
        }
    }

    /// Close a step the runner abandoned without a final event.
    pub fn abandon(&self) {
        self.end(|pb| spin_fail(pb, &pb.message()));
    }
}

impl Progress for SpinnerProgress {
    fn event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::Checking(check) => self.start(check.check_description),
            RunEvent::Passed(check) => self.end(|pb| spin_ok(pb, check.check_description)),
            RunEvent::Skipped(check) => {
                spin_skip(
                    &spinner(check.check_description),
                    &format!("{} (skipped)", check.check_description),
                );
            }
            RunEvent::Failed(check, cause) => {
                self.end(|pb| spin_fail(pb, &format!("{}: {cause}", check.check_description)));
            }
            RunEvent::Fixing(check) => self.start(check.fix_description),
            RunEvent::Fixed(check) => self.end(|pb| spin_ok(pb, check.fix_description)),
            RunEvent::CleaningUp(check) => self.start(check.cleanup_description),
            RunEvent::CleanedUp(check) => self.end(|pb| spin_ok(pb, check.cleanup_description)),
            RunEvent::CleanupFailed(check, cause) => {
                self.end(|pb| {
                    spin_fail(pb, &format!("{}: {cause}", check.cleanup_description));
                });
            }
        }
    }
}

/// Run `checks` for `purpose` and report the outcome.
///
/// A failed run is reported here and mapped to `EXIT_PREFLIGHT_FAILED`;
/// only reporting problems surface as `Err`.
pub fn execute(
    session: &Session,
    checks: &CheckSet,
    purpose: Purpose,
    json: bool,
) -> Result<u8, String> {
    let ctx = session.context();
    let result = if json {
        runner::run(checks, purpose, &ctx, &NoProgress)
    } else {
        let progress = SpinnerProgress::default();
        let result = runner::run(checks, purpose, &ctx, &progress);
        progress.abandon();
        result
    };

    if json {
        let payload = serde_json::json!({
            "distro": &session.distro,
            "network_mode": session.mode(),
            "purpose": purpose_name(purpose),
            "checks": checks.config_keys(),
            "success": result.is_ok(),
            "error": result.as_ref().err().map(ToString::to_string),
        });
        println!("{}", json_pretty(&payload)?);
    }

    match result {
        Ok(()) => Ok(EXIT_SUCCESS),
        Err(err) => {
            if !json {
                eprintln!("error: {err}");
                if let Some(hint) = manual_fix_hint(checks, &err) {
                    eprintln!("hint: {hint}");
                }
            }
            Ok(EXIT_PREFLIGHT_FAILED)
        }
    }
}

fn purpose_name(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::Verify => "setup",
        Purpose::CheckOnly => "check",
        Purpose::Cleanup => "cleanup",
    }
}

/// For checks without an automated fix, the fix description tells the user
/// what to do by hand.
fn manual_fix_hint(checks: &CheckSet, err: &PreflightError) -> Option<&'static str> {
    let PreflightError::CheckFailed { check, .. } = err else {
        return None;
    };
    checks
        .iter()
        .find(|c| c.check_description == check.as_str())
        .filter(|c| c.fix.is_none())
        .map(|c| c.fix_description)
        .filter(|hint| !hint.is_empty())
}
