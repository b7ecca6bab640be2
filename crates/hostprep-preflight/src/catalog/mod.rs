//! The fixed library of host checks.
//!
//! Every entry lives in a process-wide static and is never mutated; the
//! composer only copies entries into per-run check sets. Configuration key
//! suffixes are unique across the whole catalog because users persist them.

pub mod apparmor;
pub mod dns;
pub mod libvirt;
pub mod libvirt_network;
pub mod platform;
pub mod vsock;

pub use apparmor::UBUNTU_CHECKS;
pub use dns::{DNSMASQ_CHECKS, NETWORK_MANAGER_CHECKS, SYSTEMD_RESOLVED_CHECKS};
pub use libvirt::LIBVIRT_CHECKS;
pub use libvirt_network::LIBVIRT_NETWORK_CHECKS;
pub use platform::{GENERIC_CHECKS, NON_WIN_CHECKS};
pub use vsock::{VSOCK_CHECK, VSOCK_CHECKS};

use crate::check::{Check, CheckContext};
use crate::CheckError;

/// Name of the managed virtual machine.
pub const MACHINE_NAME: &str = "hostprep";
pub const LIBVIRT_URI: &str = "qemu:///system";
pub const LIBVIRT_GROUP: &str = "libvirt";
pub const LIBVIRT_NETWORK_NAME: &str = "hostprep";
/// Address the VM receives on the libvirt network; also its DNS server.
pub const VM_IP: &str = "192.168.130.11";
pub const DNS_DOMAIN: &str = "hostprep.testing";
pub const APPS_DNS_DOMAIN: &str = "apps-hostprep.testing";

/// Every catalog entry, in no particular order.
pub fn entries() -> impl Iterator<Item = &'static Check> {
    NON_WIN_CHECKS
        .iter()
        .chain(GENERIC_CHECKS.iter())
        .chain(LIBVIRT_CHECKS.iter())
        .chain(UBUNTU_CHECKS.iter())
        .chain(NETWORK_MANAGER_CHECKS.iter())
        .chain(SYSTEMD_RESOLVED_CHECKS.iter())
        .chain(DNSMASQ_CHECKS.iter())
        .chain(LIBVIRT_NETWORK_CHECKS.iter())
        .chain(VSOCK_CHECKS.iter())
}

pub(crate) fn systemctl_is_active(ctx: &CheckContext<'_>, unit: &str) -> bool {
    ctx.executor
        .run_with_default_locale("systemctl", &["is-active", unit])
        .is_ok_and(|out| out.stdout.trim() == "active")
}

pub(crate) fn reload_network_manager(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    ctx.executor.run_with_privilege(
        "Reloading NetworkManager",
        "systemctl",
        &["reload", "NetworkManager"],
    )?;
    Ok(())
}
