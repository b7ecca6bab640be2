use crate::config::{skip_setting, PreflightConfig};
use crate::distro::DistroContext;
use crate::CheckError;
use hostprep_exec::Executor;
use serde::Serialize;
use std::fmt;

/// Everything a check, fix, or cleanup body may consult.
pub struct CheckContext<'a> {
    pub executor: &'a dyn Executor,
    pub distro: &'a DistroContext,
    pub config: &'a PreflightConfig,
}

/// A check, fix, or cleanup body.
pub type Action = fn(&CheckContext<'_>) -> Result<(), CheckError>;

/// Execution flags carried by a catalog entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckFlags(u8);

impl CheckFlags {
    pub const NONE: Self = Self(0);
    /// Participates only in cleanup runs.
    pub const CLEANUP_ONLY: Self = Self(1);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A catalog entry: a diagnostic with optional remediation and teardown.
///
/// Entries are plain data so the catalog can live in statics. A missing
/// `fix` makes failure terminal; `cleanup` must succeed when there is
/// nothing to undo.
#[derive(Clone, Copy)]
pub struct Check {
    pub config_key_suffix: &'static str,
    pub check_description: &'static str,
    pub check: Option<Action>,
    pub fix_description: &'static str,
    pub fix: Option<Action>,
    pub cleanup_description: &'static str,
    pub cleanup: Option<Action>,
    pub flags: CheckFlags,
}

impl Check {
    /// Base value for struct-update syntax in catalog definitions.
    pub const EMPTY: Self = Self {
        config_key_suffix: "",
        check_description: "",
        check: None,
        fix_description: "",
        fix: None,
        cleanup_description: "",
        cleanup: None,
        flags: CheckFlags::NONE,
    };

    pub fn is_cleanup_only(&self) -> bool {
        self.flags.contains(CheckFlags::CLEANUP_ONLY)
    }

    /// Name used in reports: the check description, or the cleanup
    /// description for teardown-only entries.
    pub fn label(&self) -> &'static str {
        if self.check_description.is_empty() {
            self.cleanup_description
        } else {
            self.check_description
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("config_key_suffix", &self.config_key_suffix)
            .field("label", &self.label())
            .field("has_fix", &self.fix.is_some())
            .field("has_cleanup", &self.cleanup.is_some())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Serializable summary of a check for listings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckInfo {
    pub config_key: &'static str,
    /// Configuration line that disables the check; none for teardown entries.
    pub skip_setting: Option<String>,
    pub description: &'static str,
    pub fixable: bool,
    pub has_cleanup: bool,
    pub cleanup_only: bool,
    pub skipped: bool,
}

impl CheckInfo {
    pub fn new(check: &Check, config: &PreflightConfig) -> Self {
        let key = check.config_key_suffix;
        Self {
            config_key: key,
            skip_setting: (!key.is_empty()).then(|| skip_setting(key)),
            description: check.label(),
            fixable: check.fix.is_some(),
            has_cleanup: check.cleanup.is_some(),
            cleanup_only: check.is_cleanup_only(),
            skipped: config.should_skip(key),
        }
    }
}

/// Ordered checks selected for one run. Order is dependency order.
#[derive(Debug, Clone, Default)]
pub struct CheckSet {
    checks: Vec<Check>,
}

impl CheckSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, checks: &[Check]) {
        self.checks.extend_from_slice(checks);
    }

    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Check> {
        self.checks.iter()
    }

    /// Configuration keys in order, omitting unnamed teardown entries.
    pub fn config_keys(&self) -> Vec<&'static str> {
        self.checks
            .iter()
            .map(|c| c.config_key_suffix)
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn contains(&self, config_key_suffix: &str) -> bool {
        self.checks
            .iter()
            .any(|c| c.config_key_suffix == config_key_suffix)
    }

    pub fn position(&self, config_key_suffix: &str) -> Option<usize> {
        self.checks
            .iter()
            .position(|c| c.config_key_suffix == config_key_suffix)
    }

    pub fn infos(&self, config: &PreflightConfig) -> Vec<CheckInfo> {
        self.checks
            .iter()
            .map(|check| CheckInfo::new(check, config))
            .collect()
    }
}

impl From<Vec<Check>> for CheckSet {
    fn from(checks: Vec<Check>) -> Self {
        Self { checks }
    }
}

impl<'a> IntoIterator for &'a CheckSet {
    type Item = &'a Check;
    type IntoIter = std::slice::Iter<'a, Check>;

    fn into_iter(self) -> Self::IntoIter {
        self.checks.iter()
    }
}
