use crate::check::{Check, CheckContext};
use crate::CheckError;
use std::path::Path;
use tracing::debug;

pub const APPARMOR_TEMPLATE_PATH: &str = "/etc/apparmor.d/libvirt/TEMPLATE.qemu";

const INCLUDE_ANCHOR: &str = "#include <abstractions/libvirt-qemu>";

/// Extra checks for Ubuntu and its derivatives.
pub static UBUNTU_CHECKS: [Check; 1] = [Check {
    config_key_suffix: "check-apparmor-profile-setup",
    check_description: "Checking if AppArmor is configured",
    check: Some(check_apparmor_exception),
    fix_description: "Updating AppArmor configuration",
    fix: Some(add_apparmor_exception),
    cleanup_description: "Updating AppArmor configuration",
    cleanup: Some(remove_apparmor_exception),
    ..Check::EMPTY
}];

fn exception_rule(ctx: &CheckContext<'_>) -> String {
    format!("  {}/** rk,", ctx.config.cache_dir().display())
}

fn check_apparmor_exception(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let template = Path::new(APPARMOR_TEMPLATE_PATH);
    if !template.exists() {
        debug!("{APPARMOR_TEMPLATE_PATH} not found, AppArmor is not confining libvirt");
        return Ok(());
    }
    let content = std::fs::read_to_string(template)?;
    if !has_rule(&content, &exception_rule(ctx)) {
        return Err(CheckError::unmet(format!(
            "{APPARMOR_TEMPLATE_PATH} does not allow access to the machine cache directory"
        )));
    }
    Ok(())
}

fn add_apparmor_exception(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let content = std::fs::read_to_string(APPARMOR_TEMPLATE_PATH)?;
    let Some(updated) = insert_rule(&content, &exception_rule(ctx)) else {
        return Err(CheckError::unmet(format!(
            "cannot find '{INCLUDE_ANCHOR}' in {APPARMOR_TEMPLATE_PATH}"
        )));
    };
    ctx.executor.write_to_file_as_root(
        "Updating AppArmor configuration",
        &updated,
        Path::new(APPARMOR_TEMPLATE_PATH),
        0o644,
    )?;
    Ok(())
}

fn remove_apparmor_exception(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let template = Path::new(APPARMOR_TEMPLATE_PATH);
    if !template.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(template)?;
    let Some(updated) = strip_rule(&content, &exception_rule(ctx)) else {
        return Ok(());
    };
    ctx.executor.write_to_file_as_root(
        "Restoring AppArmor configuration",
        &updated,
        template,
        0o644,
    )?;
    Ok(())
}

fn has_rule(profile: &str, rule: &str) -> bool {
    profile.lines().any(|line| line.trim() == rule.trim())
}

/// Add `rule` right after the libvirt-qemu include. `None` when the profile
/// has no such include. Already-present rules are not duplicated.
pub(crate) fn insert_rule(profile: &str, rule: &str) -> Option<String> {
    if has_rule(profile, rule) {
        return Some(profile.to_owned());
    }
    let mut out = String::with_capacity(profile.len() + rule.len() + 1);
    let mut inserted = false;
    for line in profile.split_inclusive('\n') {
        out.push_str(line);
        if !inserted && line.trim() == INCLUDE_ANCHOR {
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(rule);
            out.push('\n');
            inserted = true;
        }
    }
    inserted.then_some(out)
}

/// Remove every line equal to `rule`. `None` when nothing was removed.
pub(crate) fn strip_rule(profile: &str, rule: &str) -> Option<String> {
    if !has_rule(profile, rule) {
        return None;
    }
    Some(
        profile
            .split_inclusive('\n')
            .filter(|line| line.trim() != rule.trim())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "#\n# This profile is for the domain whose UUID matches this file.\n#\n\n#include <tunables/global>\n\nprofile LIBVIRT_TEMPLATE flags=(attach_disconnected) {\n  #include <abstractions/libvirt-qemu>\n}\n";
    const RULE: &str = "  /home/user/.hostprep/cache/** rk,";

    #[test]
    fn inserts_rule_after_include() {
        let updated = insert_rule(TEMPLATE, RULE).unwrap();
        assert!(updated.contains("  #include <abstractions/libvirt-qemu>\n  /home/user/.hostprep/cache/** rk,\n}"));
        assert!(has_rule(&updated, RULE));
    }

    #[test]
    fn insert_is_idempotent() {
        let once = insert_rule(TEMPLATE, RULE).unwrap();
        let twice = insert_rule(&once, RULE).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn insert_without_anchor_fails() {
        assert!(insert_rule("profile x {\n}\n", RULE).is_none());
    }

    #[test]
    fn strip_restores_original() {
        let updated = insert_rule(TEMPLATE, RULE).unwrap();
        assert_eq!(strip_rule(&updated, RULE).unwrap(), TEMPLATE);
        assert!(strip_rule(TEMPLATE, RULE).is_none());
    }
}
