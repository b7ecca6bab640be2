//! Preflight diagnostics and host remediation for hostprep.
//!
//! This crate decides what a host needs before a libvirt virtual machine can
//! run on it and drives the host there. The `distro` probe fingerprints the
//! operating system, the `catalog` holds every known check with its fix and
//! cleanup, `compose` selects and orders the checks that apply to a given
//! distribution and network mode, and `runner` executes them: fail-fast with
//! check, fix, re-check during setup, and a full best-effort sweep during
//! cleanup.

pub mod catalog;
pub mod check;
pub mod compose;
pub mod config;
pub mod distro;
pub mod multierror;
pub mod network;
pub mod runner;

pub use check::{Action, Check, CheckContext, CheckFlags, CheckSet};
pub use compose::{all_checks, compose, uses_systemd_resolved};
pub use config::PreflightConfig;
pub use distro::{detect_context, matches_family, DistroContext};
pub use multierror::MultiError;
pub use network::NetworkMode;
pub use runner::{run, NoProgress, Progress, Purpose, RunEvent};

use thiserror::Error;

/// Failure reported by a single check, fix, or cleanup body.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Exec(#[from] hostprep_exec::ExecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Unmet(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error(transparent)]
    Multiple(#[from] MultiError<CheckError>),
}

impl CheckError {
    pub fn unmet(msg: impl Into<String>) -> Self {
        Self::Unmet(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("{check} failed: {cause}")]
    CheckFailed {
        check: String,
        #[source]
        cause: CheckError,
    },
    #[error("{check} failed and could not be fixed: {cause}")]
    FixFailed {
        check: String,
        #[source]
        cause: CheckError,
    },
    #[error("{check} still failing after fix: {cause}")]
    StillFailing {
        check: String,
        #[source]
        cause: CheckError,
    },
    #[error("{step} failed: {cause}")]
    CleanupFailed {
        step: String,
        #[source]
        cause: CheckError,
    },
    #[error("cleanup failed:\n{0}")]
    Cleanup(MultiError<PreflightError>),
    #[error("config error: {0}")]
    Config(String),
}
