use super::{reload_network_manager, systemctl_is_active, APPS_DNS_DOMAIN, DNS_DOMAIN, VM_IP};
use crate::check::{Check, CheckContext};
use crate::multierror::MultiError;
use crate::CheckError;
use std::path::Path;

pub const DISPATCHER_PATH: &str = "/etc/NetworkManager/dispatcher.d/99-hostprep.sh";
pub const DNSMASQ_CONFIG_PATH: &str = "/etc/NetworkManager/dnsmasq.d/hostprep.conf";
pub const NM_DNSMASQ_CONFIG_PATH: &str = "/etc/NetworkManager/conf.d/hostprep-nm-dnsmasq.conf";

const NM_DNSMASQ_CONFIG: &str = "[main]\ndns=dnsmasq\n";

pub static NETWORK_MANAGER_CHECKS: [Check; 2] = [
    Check {
        config_key_suffix: "check-network-manager-installed",
        check_description: "Checking if NetworkManager is installed",
        check: Some(check_network_manager_installed),
        fix_description: "NetworkManager is required and must be installed manually",
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-network-manager-running",
        check_description: "Checking if NetworkManager service is running",
        check: Some(check_network_manager_running),
        fix_description: "NetworkManager is required; start it with 'systemctl start NetworkManager'",
        ..Check::EMPTY
    },
];

pub static SYSTEMD_RESOLVED_CHECKS: [Check; 2] = [
    Check {
        config_key_suffix: "check-systemd-resolved-running",
        check_description: "Checking if the systemd-resolved service is running",
        check: Some(check_systemd_resolved_running),
        fix_description: "Starting the systemd-resolved service",
        fix: Some(fix_systemd_resolved_running),
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-network-manager-dispatcher-file",
        check_description: "Checking if /etc/NetworkManager/dispatcher.d/99-hostprep.sh exists",
        check: Some(check_dispatcher_file),
        fix_description: "Writing NetworkManager dispatcher file for hostprep",
        fix: Some(fix_dispatcher_file),
        cleanup_description: "Removing /etc/NetworkManager/dispatcher.d/99-hostprep.sh file",
        cleanup: Some(remove_dispatcher_file),
        ..Check::EMPTY
    },
];

pub static DNSMASQ_CHECKS: [Check; 2] = [
    Check {
        config_key_suffix: "check-dnsmasq-file",
        check_description: "Checking if /etc/NetworkManager/dnsmasq.d/hostprep.conf exists",
        check: Some(check_dnsmasq_file),
        fix_description: "Writing dnsmasq config for hostprep",
        fix: Some(fix_dnsmasq_file),
        cleanup_description: "Removing /etc/NetworkManager/dnsmasq.d/hostprep.conf file",
        cleanup: Some(remove_dnsmasq_file),
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-network-manager-config",
        check_description: "Checking if /etc/NetworkManager/conf.d/hostprep-nm-dnsmasq.conf exists",
        check: Some(check_nm_config),
        fix_description: "Writing NetworkManager config for hostprep",
        fix: Some(fix_nm_config),
        cleanup_description: "Removing /etc/NetworkManager/conf.d/hostprep-nm-dnsmasq.conf file",
        cleanup: Some(remove_nm_config),
        ..Check::EMPTY
    },
];

pub(crate) fn dispatcher_script() -> String {
    format!(
        r#"#!/bin/sh
# Split DNS for the hostprep libvirt network. The bridge is not managed by
# NetworkManager, so resolved is configured directly whenever it comes up.
export LC_ALL=C

if [ "$1" = "hostprep" ] && [ "$2" = "up" ]; then
    resolvectl dns hostprep {VM_IP}
    resolvectl domain hostprep ~testing
fi

exit 0
"#
    )
}

pub(crate) fn dnsmasq_config() -> String {
    format!("server=/{APPS_DNS_DOMAIN}/{VM_IP}\nserver=/{DNS_DOMAIN}/{VM_IP}\n")
}

fn check_network_manager_installed(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    if !ctx.executor.command_exists("nmcli") {
        return Err(CheckError::unmet(
            "NetworkManager is required; install it with your package manager",
        ));
    }
    Ok(())
}

fn check_network_manager_running(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    if !systemctl_is_active(ctx, "NetworkManager") {
        return Err(CheckError::unmet("NetworkManager service is not running"));
    }
    Ok(())
}

fn check_systemd_resolved_running(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    if !systemctl_is_active(ctx, "systemd-resolved") {
        return Err(CheckError::unmet("systemd-resolved service is not running"));
    }
    Ok(())
}

fn fix_systemd_resolved_running(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    ctx.executor.run_with_privilege(
        "Starting systemd-resolved",
        "systemctl",
        &["start", "systemd-resolved"],
    )?;
    Ok(())
}

fn check_dispatcher_file(_ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    check_file_content(Path::new(DISPATCHER_PATH), &dispatcher_script())
}

fn fix_dispatcher_file(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    write_nm_file(ctx, DISPATCHER_PATH, &dispatcher_script(), 0o755)
}

fn remove_dispatcher_file(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    remove_nm_file(ctx, DISPATCHER_PATH)
}

fn check_dnsmasq_file(_ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    check_file_content(Path::new(DNSMASQ_CONFIG_PATH), &dnsmasq_config())
}

fn fix_dnsmasq_file(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    write_nm_file(ctx, DNSMASQ_CONFIG_PATH, &dnsmasq_config(), 0o644)
}

fn remove_dnsmasq_file(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    remove_nm_file(ctx, DNSMASQ_CONFIG_PATH)
}

fn check_nm_config(_ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    check_file_content(Path::new(NM_DNSMASQ_CONFIG_PATH), NM_DNSMASQ_CONFIG)
}

fn fix_nm_config(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    write_nm_file(ctx, NM_DNSMASQ_CONFIG_PATH, NM_DNSMASQ_CONFIG, 0o644)
}

fn remove_nm_config(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    remove_nm_file(ctx, NM_DNSMASQ_CONFIG_PATH)
}

pub(crate) fn check_file_content(path: &Path, expected: &str) -> Result<(), CheckError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CheckError::unmet(format!("{}: {e}", path.display())))?;
    if content != expected {
        return Err(CheckError::unmet(format!(
            "{} has unexpected content",
            path.display()
        )));
    }
    Ok(())
}

fn write_nm_file(
    ctx: &CheckContext<'_>,
    path: &str,
    content: &str,
    mode: u32,
) -> Result<(), CheckError> {
    ctx.executor
        .write_to_file_as_root(&format!("Writing {path}"), content, Path::new(path), mode)?;
    reload_network_manager(ctx)
}

fn remove_nm_file(ctx: &CheckContext<'_>, path: &str) -> Result<(), CheckError> {
    if !Path::new(path).exists() {
        return Ok(());
    }
    let mut errs = MultiError::new();
    errs.check(
        ctx.executor
            .run_with_privilege(&format!("Removing {path}"), "rm", &["-f", path])
            .map_err(CheckError::from),
    );
    errs.check(reload_network_manager(ctx));
    Ok(errs.into_result()?)
}
