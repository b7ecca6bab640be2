//! Check-set composition.
//!
//! Selection is a declarative rule table: each rule pairs a predicate over
//! the distribution and network mode with a catalog slice. Rules are
//! evaluated in table order, which is the dependency order of the result.

use crate::catalog::{
    DNSMASQ_CHECKS, GENERIC_CHECKS, LIBVIRT_CHECKS, LIBVIRT_NETWORK_CHECKS,
    NETWORK_MANAGER_CHECKS, NON_WIN_CHECKS, SYSTEMD_RESOLVED_CHECKS, UBUNTU_CHECKS, VSOCK_CHECK,
    VSOCK_CHECKS,
};
use crate::check::{Check, CheckSet};
use crate::distro::{matches_family, version_at_least, DistroContext, FEDORA, UBUNTU};
use crate::network::NetworkMode;
use tracing::{debug, warn};

/// First Fedora release that ships systemd-resolved by default.
pub const FEDORA_SYSTEMD_RESOLVED_VERSION: &str = "33";

struct Selection<'a> {
    distro: &'a DistroContext,
    mode: NetworkMode,
}

struct Rule {
    name: &'static str,
    applies: fn(&Selection<'_>) -> bool,
    checks: &'static [Check],
}

static RULES: [Rule; 9] = [
    Rule {
        name: "non-windows",
        applies: |_| true,
        checks: &NON_WIN_CHECKS,
    },
    Rule {
        name: "generic",
        applies: |_| true,
        checks: &GENERIC_CHECKS,
    },
    Rule {
        name: "libvirt",
        applies: |_| true,
        checks: &LIBVIRT_CHECKS,
    },
    Rule {
        name: "ubuntu",
        applies: |s| matches_family(Some(s.distro), UBUNTU),
        checks: &UBUNTU_CHECKS,
    },
    // The socket transport replaces every host network check.
    Rule {
        name: "vsock",
        applies: |s| s.mode == NetworkMode::Vsock,
        checks: &VSOCK_CHECKS,
    },
    Rule {
        name: "network-manager",
        applies: |s| s.mode != NetworkMode::Vsock,
        checks: &NETWORK_MANAGER_CHECKS,
    },
    Rule {
        name: "systemd-resolved",
        applies: |s| s.mode != NetworkMode::Vsock && uses_systemd_resolved(s.distro),
        checks: &SYSTEMD_RESOLVED_CHECKS,
    },
    Rule {
        name: "dnsmasq",
        applies: |s| s.mode != NetworkMode::Vsock && !uses_systemd_resolved(s.distro),
        checks: &DNSMASQ_CHECKS,
    },
    Rule {
        name: "libvirt-network",
        applies: |s| s.mode == NetworkMode::Default,
        checks: &LIBVIRT_NETWORK_CHECKS,
    },
];

/// Whether host DNS for the VM goes through systemd-resolved rather than
/// NetworkManager's dnsmasq plugin.
pub fn uses_systemd_resolved(distro: &DistroContext) -> bool {
    if matches_family(Some(distro), UBUNTU) {
        return true;
    }
    if matches_family(Some(distro), FEDORA) {
        return version_at_least(&distro.version_id, FEDORA_SYSTEMD_RESOLVED_VERSION);
    }
    false
}

/// Select and order the checks that apply to `distro` in `mode`.
///
/// Never empty: an unrecognized distribution gets the generic set and the
/// NetworkManager-based network checks.
pub fn compose(distro: &DistroContext, mode: NetworkMode) -> CheckSet {
    if mode != NetworkMode::Vsock
        && !matches_family(Some(distro), UBUNTU)
        && !matches_family(Some(distro), FEDORA)
    {
        warn!(
            "distribution-specific preflight checks are not implemented for '{}'",
            distro.id
        );
    }

    let selection = Selection { distro, mode };
    let mut set = CheckSet::new();
    for rule in &RULES {
        if (rule.applies)(&selection) {
            debug!("applying '{}' checks ({})", rule.name, rule.checks.len());
            set.extend(rule.checks);
        }
    }
    set
}

/// Every check that any run on `distro` could need, regardless of network
/// mode: the default-mode set plus the socket transport check.
pub fn all_checks(distro: &DistroContext) -> CheckSet {
    let mut set = compose(distro, NetworkMode::Default);
    set.push(VSOCK_CHECK);
    set
}
