use super::{systemctl_is_active, LIBVIRT_GROUP, LIBVIRT_URI, MACHINE_NAME};
use crate::check::{Check, CheckContext, CheckFlags};
use crate::distro::{DistroContext, DEBIAN, FEDORA, SUSE, UBUNTU};
use crate::CheckError;
use hostprep_exec::{CommandOutput, ExecError};
use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const DRIVER_NAME: &str = "hostprep-driver-libvirt";
pub const DRIVER_VERSION: &str = "0.13.8";
pub const MIN_LIBVIRT_VERSION: (u32, u32, u32) = (3, 4, 0);

const LIBVIRT_UNITS: [&str; 3] = ["libvirtd.service", "virtqemud.socket", "libvirtd.socket"];

/// Hypervisor stack checks in dependency order, followed by VM teardown.
pub static LIBVIRT_CHECKS: [Check; 8] = [
    Check {
        config_key_suffix: "check-virt-enabled",
        check_description: "Checking if Virtualization is enabled",
        check: Some(check_virtualization_enabled),
        fix_description: "Enable virtualization in the firmware (BIOS/UEFI) settings",
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-kvm-enabled",
        check_description: "Checking if KVM is enabled",
        check: Some(check_kvm_enabled),
        fix_description: "Setting up KVM",
        fix: Some(fix_kvm_enabled),
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-libvirt-installed",
        check_description: "Checking if libvirt is installed",
        check: Some(check_libvirt_installed),
        fix_description: "Installing libvirt service and dependencies",
        fix: Some(fix_libvirt_installed),
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-user-in-libvirt-group",
        check_description: "Checking if user is part of libvirt group",
        check: Some(check_user_in_libvirt_group),
        fix_description: "Adding user to libvirt group",
        fix: Some(fix_user_in_libvirt_group),
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-libvirt-running",
        check_description: "Checking if libvirt daemon is running",
        check: Some(check_libvirt_running),
        fix_description: "Starting libvirt service",
        fix: Some(fix_libvirt_running),
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-libvirt-version",
        check_description: "Checking if a supported libvirt version is installed",
        check: Some(check_libvirt_version),
        fix_description: "Update libvirt with your package manager",
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-libvirt-driver",
        check_description: "Checking if hostprep-driver-libvirt is installed",
        check: Some(check_driver_installed),
        fix_description: "Installing hostprep-driver-libvirt",
        fix: Some(fix_driver_installed),
        ..Check::EMPTY
    },
    Check {
        cleanup_description: "Removing the hostprep VM if it exists",
        cleanup: Some(remove_vm),
        flags: CheckFlags::CLEANUP_ONLY,
        ..Check::EMPTY
    },
];

pub(crate) fn virsh(ctx: &CheckContext<'_>, args: &[&str]) -> Result<CommandOutput, ExecError> {
    let mut full = vec!["--connect", LIBVIRT_URI];
    full.extend_from_slice(args);
    ctx.executor.run_with_default_locale("virsh", &full)
}

fn check_virtualization_enabled(_ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo")?;
    if cpu_virtualization_flag(&cpuinfo).is_none() {
        return Err(CheckError::unmet(
            "virtualization is not available for your CPU or is disabled in the firmware",
        ));
    }
    Ok(())
}

fn check_kvm_enabled(_ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    if !Path::new("/dev/kvm").exists() {
        return Err(CheckError::unmet(
            "/dev/kvm does not exist; the kvm kernel module is not loaded",
        ));
    }
    Ok(())
}

fn fix_kvm_enabled(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo").unwrap_or_default();
    let module = kvm_module(&cpuinfo);
    ctx.executor.run_with_privilege(
        &format!("Loading {module} kernel module"),
        "modprobe",
        &[module],
    )?;
    Ok(())
}

fn check_libvirt_installed(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    if !ctx.executor.command_exists("virsh") {
        return Err(CheckError::unmet("virsh was not found in PATH"));
    }
    Ok(())
}

fn fix_libvirt_installed(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let (program, args) = libvirt_install_command(ctx.distro).ok_or_else(|| {
        CheckError::unmet(format!(
            "automatic libvirt installation is not supported on '{}'; install libvirt manually",
            ctx.distro.id
        ))
    })?;
    ctx.executor
        .run_with_privilege("Installing libvirt packages", program, &args)?;
    Ok(())
}

fn check_user_in_libvirt_group(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let user = current_user(ctx)?;
    let out = ctx
        .executor
        .run_with_default_locale("id", &["-Gn", &user])?;
    if !out.stdout.split_whitespace().any(|g| g == LIBVIRT_GROUP) {
        return Err(CheckError::unmet(format!(
            "user '{user}' is not a member of the '{LIBVIRT_GROUP}' group"
        )));
    }
    Ok(())
}

fn fix_user_in_libvirt_group(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let user = current_user(ctx)?;
    ctx.executor.run_with_privilege(
        "Adding user to libvirt group",
        "usermod",
        &["-a", "-G", LIBVIRT_GROUP, &user],
    )?;
    info!("log out and back in for the new group membership to apply to existing sessions");
    Ok(())
}

fn check_libvirt_running(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    if LIBVIRT_UNITS.iter().any(|unit| systemctl_is_active(ctx, unit)) {
        return Ok(());
    }
    Err(CheckError::unmet("libvirt daemon is not running"))
}

fn fix_libvirt_running(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    ctx.executor.run_with_privilege(
        "Starting libvirt service",
        "systemctl",
        &["start", "libvirtd"],
    )?;
    Ok(())
}

fn check_libvirt_version(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let out = ctx.executor.run_with_default_locale("virsh", &["-v"])?;
    let raw = out.stdout.trim();
    let found = parse_version(raw)
        .ok_or_else(|| CheckError::unmet(format!("cannot parse libvirt version '{raw}'")))?;
    if found < MIN_LIBVIRT_VERSION {
        let (major, minor, patch) = MIN_LIBVIRT_VERSION;
        return Err(CheckError::unmet(format!(
            "libvirt v{major}.{minor}.{patch} or newer is required, found v{raw}"
        )));
    }
    Ok(())
}

fn check_driver_installed(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let path = ctx.config.bin_dir().join(DRIVER_NAME);
    let meta = std::fs::metadata(&path)
        .map_err(|e| CheckError::unmet(format!("{}: {e}", path.display())))?;
    if meta.permissions().mode() & 0o111 == 0 {
        return Err(CheckError::unmet(format!(
            "{} is not executable",
            path.display()
        )));
    }
    let out = ctx
        .executor
        .run_with_default_locale(&path.to_string_lossy(), &["version"])?;
    if !out.stdout.contains(DRIVER_VERSION) {
        return Err(CheckError::unmet(format!(
            "{DRIVER_NAME} is outdated: expected version {DRIVER_VERSION}, got '{}'",
            out.stdout.trim()
        )));
    }
    Ok(())
}

fn fix_driver_installed(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let bin_dir = ctx.config.bin_dir();
    std::fs::create_dir_all(&bin_dir)?;
    info!("downloading {DRIVER_NAME} from {}", ctx.config.driver_url);

    let resp = ureq::get(&ctx.config.driver_url)
        .call()
        .map_err(|e| CheckError::Download(format!("{}: {e}", ctx.config.driver_url)))?;
    let mut staged = NamedTempFile::new_in(&bin_dir)?;
    let mut body = resp.into_body().into_reader();
    std::io::copy(&mut body, &mut staged)?;
    staged.flush()?;
    staged.as_file().set_permissions(Permissions::from_mode(0o755))?;
    staged
        .persist(bin_dir.join(DRIVER_NAME))
        .map_err(|e| CheckError::Io(e.error))?;
    Ok(())
}

fn remove_vm(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let Ok(state) = virsh(ctx, &["domstate", MACHINE_NAME]) else {
        debug!("no '{MACHINE_NAME}' domain defined");
        return Ok(());
    };
    if state.stdout.trim() != "shut off" {
        virsh(ctx, &["destroy", MACHINE_NAME])?;
    }
    virsh(ctx, &["undefine", MACHINE_NAME])?;
    Ok(())
}

fn current_user(ctx: &CheckContext<'_>) -> Result<String, CheckError> {
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return Ok(user);
        }
    }
    let out = ctx.executor.run_with_default_locale("id", &["-un"])?;
    Ok(out.stdout.trim().to_owned())
}

/// `vmx` (Intel VT-x) or `svm` (AMD-V) when present in the CPU flags.
pub(crate) fn cpu_virtualization_flag(cpuinfo: &str) -> Option<&'static str> {
    for line in cpuinfo.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() != "flags" {
            continue;
        }
        for flag in value.split_whitespace() {
            match flag {
                "vmx" => return Some("vmx"),
                "svm" => return Some("svm"),
                _ => {}
            }
        }
    }
    None
}

pub(crate) fn kvm_module(cpuinfo: &str) -> &'static str {
    match cpu_virtualization_flag(cpuinfo) {
        Some("vmx") => "kvm_intel",
        Some("svm") => "kvm_amd",
        _ => "kvm",
    }
}

/// Package manager invocation that installs libvirt on `distro`.
pub(crate) fn libvirt_install_command(
    distro: &DistroContext,
) -> Option<(&'static str, Vec<&'static str>)> {
    if distro.is_like(FEDORA) {
        Some((
            "dnf",
            vec!["install", "-y", "libvirt", "libvirt-daemon-kvm", "qemu-kvm"],
        ))
    } else if distro.is_like(UBUNTU) || distro.is_like(DEBIAN) {
        Some((
            "apt-get",
            vec![
                "install",
                "-y",
                "qemu-kvm",
                "libvirt-daemon",
                "libvirt-daemon-system",
                "libvirt-clients",
            ],
        ))
    } else if distro.is_like(SUSE) {
        Some((
            "zypper",
            vec!["--non-interactive", "install", "libvirt", "qemu-kvm"],
        ))
    } else {
        None
    }
}

pub(crate) fn parse_version(raw: &str) -> Option<(u32, u32, u32)> {
    let mut parts = raw.trim().splitn(3, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch = parts.next().map_or(Some(0), |p| {
        let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    })?;
    Some((major, minor, patch))
}
