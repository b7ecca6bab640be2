use super::libvirt::virsh;
use super::{LIBVIRT_NETWORK_NAME, VM_IP};
use crate::check::{Check, CheckContext};
use crate::CheckError;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::debug;

/// Checks for the libvirt NAT network; only meaningful in the default
/// network mode.
pub static LIBVIRT_NETWORK_CHECKS: [Check; 2] = [
    Check {
        config_key_suffix: "check-libvirt-network",
        check_description: "Checking if libvirt 'hostprep' network is available",
        check: Some(check_network_available),
        fix_description: "Setting up libvirt 'hostprep' network",
        fix: Some(fix_network_available),
        cleanup_description: "Removing 'hostprep' network from libvirt",
        cleanup: Some(remove_network),
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-libvirt-network-active",
        check_description: "Checking if libvirt 'hostprep' network is active",
        check: Some(check_network_active),
        fix_description: "Starting libvirt 'hostprep' network",
        fix: Some(fix_network_active),
        ..Check::EMPTY
    },
];

pub(crate) fn network_xml() -> String {
    format!(
        r"<network>
  <name>{LIBVIRT_NETWORK_NAME}</name>
  <forward mode='nat'>
    <nat>
      <port start='1024' end='65535'/>
    </nat>
  </forward>
  <bridge name='{LIBVIRT_NETWORK_NAME}' stp='on' delay='0'/>
  <mac address='52:fd:fc:07:21:82'/>
  <ip family='ipv4' address='192.168.130.1' prefix='24'>
    <dhcp>
      <host mac='52:fd:fc:07:21:82' ip='{VM_IP}'/>
    </dhcp>
  </ip>
</network>
"
    )
}

fn check_network_available(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    virsh(ctx, &["net-info", LIBVIRT_NETWORK_NAME]).map_err(|_| {
        CheckError::unmet(format!(
            "libvirt network '{LIBVIRT_NETWORK_NAME}' is not defined"
        ))
    })?;
    Ok(())
}

fn fix_network_available(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let mut definition = NamedTempFile::new()?;
    definition.write_all(network_xml().as_bytes())?;
    definition.flush()?;
    let path = definition.path().to_string_lossy().into_owned();

    virsh(ctx, &["net-define", &path])?;
    virsh(ctx, &["net-autostart", LIBVIRT_NETWORK_NAME])?;
    Ok(())
}

fn remove_network(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let Ok(info) = virsh(ctx, &["net-info", LIBVIRT_NETWORK_NAME]) else {
        debug!("libvirt network '{LIBVIRT_NETWORK_NAME}' already absent");
        return Ok(());
    };
    if network_is_active(&info.stdout) {
        virsh(ctx, &["net-destroy", LIBVIRT_NETWORK_NAME])?;
    }
    virsh(ctx, &["net-undefine", LIBVIRT_NETWORK_NAME])?;
    Ok(())
}

fn check_network_active(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let info = virsh(ctx, &["net-info", LIBVIRT_NETWORK_NAME])?;
    if !network_is_active(&info.stdout) {
        return Err(CheckError::unmet(format!(
            "libvirt network '{LIBVIRT_NETWORK_NAME}' is not active"
        )));
    }
    Ok(())
}

fn fix_network_active(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    virsh(ctx, &["net-start", LIBVIRT_NETWORK_NAME])?;
    Ok(())
}

/// Reads the `Active:` field of `virsh net-info` output.
pub(crate) fn network_is_active(net_info: &str) -> bool {
    net_info.lines().any(|line| {
        line.split_once(':')
            .is_some_and(|(k, v)| k.trim() == "Active" && v.trim() == "yes")
    })
}
