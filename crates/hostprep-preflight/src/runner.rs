//! Check execution.
//!
//! Setup and cleanup deliberately aggregate differently. Checks are
//! ordered by dependency, so setup stops at the first check that stays
//! failing. Cleanup actions are independent, so every one is attempted and
//! all failures are reported together.

use crate::check::{Check, CheckContext, CheckSet};
use crate::config::skip_setting;
use crate::multierror::MultiError;
use crate::{CheckError, PreflightError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Check, fix on failure, re-check once. Fail fast.
    Verify,
    /// Check without attempting fixes. Fail fast.
    CheckOnly,
    /// Run every cleanup action, last-configured first. Fail soft.
    Cleanup,
}

/// Progress notifications emitted while a check set runs.
#[derive(Debug)]
pub enum RunEvent<'a> {
    Checking(&'a Check),
    Passed(&'a Check),
    Skipped(&'a Check),
    Failed(&'a Check, &'a CheckError),
    Fixing(&'a Check),
    Fixed(&'a Check),
    CleaningUp(&'a Check),
    CleanedUp(&'a Check),
    CleanupFailed(&'a Check, &'a CheckError),
}

pub trait Progress {
    fn event(&self, event: &RunEvent<'_>);
}

/// Discards progress events.
pub struct NoProgress;

impl Progress for NoProgress {
    fn event(&self, _event: &RunEvent<'_>) {}
}

pub fn run(
    checks: &CheckSet,
    purpose: Purpose,
    ctx: &CheckContext<'_>,
    progress: &dyn Progress,
) -> Result<(), PreflightError> {
    match purpose {
        Purpose::Verify => verify(checks, ctx, progress, true),
        Purpose::CheckOnly => verify(checks, ctx, progress, false),
        Purpose::Cleanup => cleanup(checks, ctx, progress),
    }
}

fn verify(
    checks: &CheckSet,
    ctx: &CheckContext<'_>,
    progress: &dyn Progress,
    allow_fix: bool,
) -> Result<(), PreflightError> {
    for check in checks.iter().filter(|c| !c.is_cleanup_only()) {
        let Some(probe) = check.check else {
            continue;
        };
        if ctx.config.should_skip(check.config_key_suffix) {
            info!(
                "skipping '{}' ({} = true)",
                check.check_description,
                skip_setting(check.config_key_suffix)
            );
            progress.event(&RunEvent::Skipped(check));
            continue;
        }

        info!("{}", check.check_description);
        progress.event(&RunEvent::Checking(check));
        let cause = match probe(ctx) {
            Ok(()) => {
                progress.event(&RunEvent::Passed(check));
                continue;
            }
            Err(cause) => cause,
        };
        debug!("{} failed: {cause}", check.check_description);
        progress.event(&RunEvent::Failed(check, &cause));

        let fix = match check.fix {
            Some(fix) if allow_fix => fix,
            _ => {
                return Err(PreflightError::CheckFailed {
                    check: check.check_description.to_owned(),
                    cause,
                })
            }
        };

        info!("{}", check.fix_description);
        progress.event(&RunEvent::Fixing(check));
        fix(ctx).map_err(|cause| PreflightError::FixFailed {
            check: check.check_description.to_owned(),
            cause,
        })?;
        probe(ctx).map_err(|cause| PreflightError::StillFailing {
            check: check.check_description.to_owned(),
            cause,
        })?;
        progress.event(&RunEvent::Fixed(check));
    }
    Ok(())
}

fn cleanup(
    checks: &CheckSet,
    ctx: &CheckContext<'_>,
    progress: &dyn Progress,
) -> Result<(), PreflightError> {
    let mut errs = MultiError::new();
    // Undo later setup first; earlier checks' state may still be in use.
    for check in checks.iter().rev() {
        let Some(action) = check.cleanup else {
            continue;
        };
        info!("{}", check.cleanup_description);
        progress.event(&RunEvent::CleaningUp(check));
        match action(ctx) {
            Ok(()) => progress.event(&RunEvent::CleanedUp(check)),
            Err(cause) => {
                warn!("{} failed: {cause}", check.cleanup_description);
                progress.event(&RunEvent::CleanupFailed(check, &cause));
                errs.collect(PreflightError::CleanupFailed {
                    step: check.cleanup_description.to_owned(),
                    cause,
                });
            }
        }
    }
    errs.into_result().map_err(PreflightError::Cleanup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckFlags;
    use crate::config::PreflightConfig;
    use crate::distro::DistroContext;
    use hostprep_exec::MockExecutor;
    use std::sync::Mutex;

    // Actions are plain fns, so each one talks to the mock under its own
    // program name and the mock's script decides the outcome.
    fn probe_a(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        ctx.executor.run_with_default_locale("probe-a", &[])?;
        Ok(())
    }

    fn fix_a(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        ctx.executor.run_with_privilege("fix a", "fix-a", &[])?;
        Ok(())
    }

    fn probe_b(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        ctx.executor.run_with_default_locale("probe-b", &[])?;
        Ok(())
    }

    fn clean_a(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        ctx.executor.run_with_privilege("clean a", "clean-a", &[])?;
        Ok(())
    }

    fn clean_b(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        ctx.executor.run_with_privilege("clean b", "clean-b", &[])?;
        Ok(())
    }

    fn teardown(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        ctx.executor.run_with_privilege("teardown", "teardown", &[])?;
        Ok(())
    }

    const FIXABLE: Check = Check {
        config_key_suffix: "check-a",
        check_description: "Checking a",
        check: Some(probe_a),
        fix_description: "Fixing a",
        fix: Some(fix_a),
        cleanup_description: "Cleaning a",
        cleanup: Some(clean_a),
        flags: CheckFlags::NONE,
    };

    const TERMINAL: Check = Check {
        config_key_suffix: "check-b",
        check_description: "Checking b",
        check: Some(probe_b),
        fix_description: "b must be fixed by hand",
        cleanup_description: "Cleaning b",
        cleanup: Some(clean_b),
        ..Check::EMPTY
    };

    const TEARDOWN: Check = Check {
        cleanup_description: "Tearing down",
        cleanup: Some(teardown),
        flags: CheckFlags::CLEANUP_ONLY,
        ..Check::EMPTY
    };

    struct Fixture {
        mock: MockExecutor,
        distro: DistroContext,
        config: PreflightConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                mock: MockExecutor::new(),
                distro: DistroContext::new("fedora", "38", &[]),
                config: PreflightConfig::default(),
            }
        }

        fn run(&self, checks: &[Check], purpose: Purpose) -> Result<(), PreflightError> {
            self.run_with(checks, purpose, &NoProgress)
        }

        fn run_with(
            &self,
            checks: &[Check],
            purpose: Purpose,
            progress: &dyn Progress,
        ) -> Result<(), PreflightError> {
            let ctx = CheckContext {
                executor: &self.mock,
                distro: &self.distro,
                config: &self.config,
            };
            run(&CheckSet::from(checks.to_vec()), purpose, &ctx, progress)
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Progress for Recorder {
        fn event(&self, event: &RunEvent<'_>) {
            let line = match event {
                RunEvent::Checking(c) => format!("checking {}", c.config_key_suffix),
                RunEvent::Passed(c) => format!("passed {}", c.config_key_suffix),
                RunEvent::Skipped(c) => format!("skipped {}", c.config_key_suffix),
                RunEvent::Failed(c, _) => format!("failed {}", c.config_key_suffix),
                RunEvent::Fixing(c) => format!("fixing {}", c.config_key_suffix),
                RunEvent::Fixed(c) => format!("fixed {}", c.config_key_suffix),
                RunEvent::CleaningUp(c) => format!("cleaning {}", c.label()),
                RunEvent::CleanedUp(c) => format!("cleaned {}", c.label()),
                RunEvent::CleanupFailed(c, _) => format!("cleanup-failed {}", c.label()),
            };
            self.0.lock().unwrap().push(line);
        }
    }

    #[test]
    fn verify_passes_without_fixing() {
        let f = Fixture::new();
        f.run(&[FIXABLE, TERMINAL], Purpose::Verify).unwrap();
        assert_eq!(f.mock.calls(), vec!["probe-a", "probe-b"]);
    }

    #[test]
    fn verify_fixes_and_rechecks_once() {
        let f = Fixture::new();
        f.mock.push_failure("probe-a", "missing");
        f.run(&[FIXABLE, TERMINAL], Purpose::Verify).unwrap();
        assert_eq!(
            f.mock.calls(),
            vec!["probe-a", "sudo fix-a", "probe-a", "probe-b"]
        );
    }

    #[test]
    fn verify_reports_check_still_failing_after_fix() {
        let f = Fixture::new();
        f.mock.always_fail("probe-a", "missing");
        let err = f.run(&[FIXABLE, TERMINAL], Purpose::Verify).unwrap_err();
        assert!(matches!(err, PreflightError::StillFailing { ref check, .. } if check == "Checking a"));
        // The check is re-run exactly once and later checks never start.
        assert_eq!(f.mock.calls(), vec!["probe-a", "sudo fix-a", "probe-a"]);
    }

    #[test]
    fn verify_stops_when_fix_fails() {
        let f = Fixture::new();
        f.mock
            .push_failure("probe-a", "missing")
            .push_failure("fix-a", "permission denied");
        let err = f.run(&[FIXABLE, TERMINAL], Purpose::Verify).unwrap_err();
        assert!(matches!(err, PreflightError::FixFailed { .. }));
        assert!(err.to_string().contains("permission denied"));
        assert!(!f.mock.called("probe-b"));
    }

    #[test]
    fn verify_without_fix_is_terminal() {
        let f = Fixture::new();
        f.mock.push_failure("probe-b", "nope");
        let err = f.run(&[TERMINAL, FIXABLE], Purpose::Verify).unwrap_err();
        assert!(matches!(err, PreflightError::CheckFailed { .. }));
        assert_eq!(f.mock.calls(), vec!["probe-b"]);
    }

    #[test]
    fn check_only_never_fixes() {
        let f = Fixture::new();
        f.mock.push_failure("probe-a", "missing");
        let err = f.run(&[FIXABLE], Purpose::CheckOnly).unwrap_err();
        assert!(matches!(err, PreflightError::CheckFailed { .. }));
        assert!(!f.mock.called("fix-a"));
    }

    #[test]
    fn verify_ignores_cleanup_only_entries() {
        let f = Fixture::new();
        f.run(&[TEARDOWN, FIXABLE], Purpose::Verify).unwrap();
        assert!(!f.mock.called("teardown"));
        assert_eq!(f.mock.calls(), vec!["probe-a"]);
    }

    #[test]
    fn verify_honors_skip_settings() {
        let mut f = Fixture::new();
        f.config.skip.insert("check-a".to_owned(), true);
        f.mock.always_fail("probe-a", "would fail");
        let recorder = Recorder::default();
        f.run_with(&[FIXABLE, TERMINAL], Purpose::Verify, &recorder)
            .unwrap();
        assert_eq!(f.mock.calls(), vec!["probe-b"]);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["skipped check-a", "checking check-b", "passed check-b"]
        );
    }

    #[test]
    fn progress_sees_fix_cycle() {
        let f = Fixture::new();
        f.mock.push_failure("probe-a", "missing");
        let recorder = Recorder::default();
        f.run_with(&[FIXABLE], Purpose::Verify, &recorder).unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["checking check-a", "failed check-a", "fixing check-a", "fixed check-a"]
        );
    }

    #[test]
    fn cleanup_runs_every_action_in_reverse() {
        let f = Fixture::new();
        f.run(&[FIXABLE, TERMINAL, TEARDOWN], Purpose::Cleanup)
            .unwrap();
        assert_eq!(
            f.mock.calls(),
            vec!["sudo teardown", "sudo clean-b", "sudo clean-a"]
        );
    }

    #[test]
    fn cleanup_continues_past_failures_and_aggregates() {
        let f = Fixture::new();
        f.mock
            .always_fail("clean-b", "busy")
            .always_fail("teardown", "gone");
        let err = f
            .run(&[FIXABLE, TERMINAL, TEARDOWN], Purpose::Cleanup)
            .unwrap_err();
        assert!(f.mock.called("clean-a"));
        let PreflightError::Cleanup(errs) = &err else {
            panic!("expected aggregated cleanup error, got {err:?}");
        };
        assert_eq!(errs.len(), 2);
        let msg = err.to_string();
        assert!(msg.contains("Cleaning b failed"));
        assert!(msg.contains("Tearing down failed"));
    }

    #[test]
    fn cleanup_does_not_probe() {
        let f = Fixture::new();
        f.run(&[FIXABLE], Purpose::Cleanup).unwrap();
        assert!(!f.mock.called("probe-a"));
    }

    #[test]
    fn empty_set_succeeds_for_every_purpose() {
        let f = Fixture::new();
        for purpose in [Purpose::Verify, Purpose::CheckOnly, Purpose::Cleanup] {
            f.run(&[], purpose).unwrap();
        }
        assert!(f.mock.calls().is_empty());
    }
}
