use super::LIBVIRT_GROUP;
use crate::check::{Check, CheckContext};
use crate::multierror::MultiError;
use crate::CheckError;
use std::path::Path;

pub const VSOCK_UDEV_RULES_PATH: &str = "/usr/lib/udev/rules.d/99-hostprep-vsock.rules";
pub const VSOCK_MODULE_AUTOLOAD_PATH: &str = "/etc/modules-load.d/vhost_vsock.conf";

const VSOCK_DEVICE: &str = "/dev/vsock";
const UDEV_RULE: &str = r#"KERNEL=="vsock", MODE="0660", OWNER="root", GROUP="libvirt""#;

/// Host configuration for the direct socket transport.
pub const VSOCK_CHECK: Check = Check {
    config_key_suffix: "check-vsock",
    check_description: "Checking if vsock is correctly configured",
    check: Some(check_vsock),
    fix_description: "Setting up vsock support",
    fix: Some(fix_vsock),
    cleanup_description: "Removing vsock configuration",
    cleanup: Some(remove_vsock_settings),
    ..Check::EMPTY
};

pub static VSOCK_CHECKS: [Check; 1] = [VSOCK_CHECK];

fn check_vsock(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let executable = std::env::current_exe()?;
    let exe = executable.to_string_lossy();
    let getcap = ctx.executor.run_with_default_locale("getcap", &[&exe])?;
    if !has_bind_capability(&getcap.stdout) {
        return Err(CheckError::unmet(format!(
            "capabilities are not correct for {exe}"
        )));
    }

    let stat = ctx
        .executor
        .run_with_default_locale("stat", &["-c", "%G %a", VSOCK_DEVICE])?;
    let (group, mode) = parse_group_and_mode(&stat.stdout)
        .ok_or_else(|| CheckError::unmet(format!("cannot stat {VSOCK_DEVICE}")))?;
    if group != LIBVIRT_GROUP {
        return Err(CheckError::unmet(format!(
            "{VSOCK_DEVICE} is not in the {LIBVIRT_GROUP} group"
        )));
    }
    if mode & 0o060 == 0 {
        return Err(CheckError::unmet(format!(
            "{VSOCK_DEVICE} doesn't have the right permissions"
        )));
    }
    Ok(())
}

fn fix_vsock(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let executable = std::env::current_exe()?;
    let exe = executable.to_string_lossy();
    ctx.executor.run_with_privilege(
        "setcap cap_net_bind_service=+eip",
        "setcap",
        &["cap_net_bind_service=+eip", &exe],
    )?;
    ctx.executor.write_to_file_as_root(
        "Create udev rule for /dev/vsock",
        UDEV_RULE,
        Path::new(VSOCK_UDEV_RULES_PATH),
        0o644,
    )?;
    ctx.executor.write_to_file_as_root(
        &format!("Create file {VSOCK_MODULE_AUTOLOAD_PATH}"),
        "vhost_vsock",
        Path::new(VSOCK_MODULE_AUTOLOAD_PATH),
        0o644,
    )?;
    ctx.executor
        .run_with_privilege("modprobe vhost_vsock", "modprobe", &["vhost_vsock"])?;
    Ok(())
}

fn remove_vsock_settings(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let mut errs = MultiError::new();
    for path in [VSOCK_UDEV_RULES_PATH, VSOCK_MODULE_AUTOLOAD_PATH] {
        errs.check(
            ctx.executor
                .run_with_privilege(&format!("rm {path}"), "rm", &["-f", path])
                .map_err(CheckError::from),
        );
    }
    Ok(errs.into_result()?)
}

/// getcap prints `cap_net_bind_service+eip` or `cap_net_bind_service=eip`
/// depending on the libcap version.
pub(crate) fn has_bind_capability(getcap: &str) -> bool {
    getcap.contains("cap_net_bind_service+eip") || getcap.contains("cap_net_bind_service=eip")
}

pub(crate) fn parse_group_and_mode(stat: &str) -> Option<(&str, u32)> {
    let mut fields = stat.split_whitespace();
    let group = fields.next()?;
    let mode = u32::from_str_radix(fields.next()?, 8).ok()?;
    Some((group, mode))
}
