use crate::check::{Check, CheckContext, CheckFlags};
use crate::CheckError;
use std::path::Path;
use tracing::debug;

pub static NON_WIN_CHECKS: [Check; 1] = [Check {
    config_key_suffix: "check-root-user",
    check_description: "Checking if running as non-root",
    check: Some(check_running_as_normal_user),
    fix_description: "hostprep should be run as a normal user",
    ..Check::EMPTY
}];

pub static GENERIC_CHECKS: [Check; 4] = [
    Check {
        config_key_suffix: "check-ram",
        check_description: "Checking minimum RAM requirements",
        check: Some(check_memory),
        fix_description: "Not enough memory to run the virtual machine",
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-cpus",
        check_description: "Checking minimum CPU requirements",
        check: Some(check_cpus),
        fix_description: "Not enough CPUs to run the virtual machine",
        ..Check::EMPTY
    },
    Check {
        config_key_suffix: "check-disk-space",
        check_description: "Checking available disk space",
        check: Some(check_disk_space),
        fix_description: "Not enough free disk space for the virtual machine",
        ..Check::EMPTY
    },
    Check {
        cleanup_description: "Removing machine instance directory",
        cleanup: Some(remove_machines_dir),
        flags: CheckFlags::CLEANUP_ONLY,
        ..Check::EMPTY
    },
];

fn check_running_as_normal_user(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let out = ctx.executor.run_with_default_locale("id", &["-u"])?;
    match out.stdout.trim() {
        "0" => Err(CheckError::unmet(
            "hostprep should not be run as root; run it as a normal user",
        )),
        uid if uid.parse::<u32>().is_ok() => Ok(()),
        other => Err(CheckError::unmet(format!("cannot parse user id '{other}'"))),
    }
}

fn check_memory(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let meminfo = std::fs::read_to_string("/proc/meminfo")?;
    let total_kib = parse_mem_total_kib(&meminfo)
        .ok_or_else(|| CheckError::unmet("MemTotal not found in /proc/meminfo"))?;
    let total_mib = total_kib / 1024;
    debug!("host memory: {total_mib} MiB");
    if total_mib < ctx.config.memory {
        return Err(CheckError::unmet(format!(
            "only {total_mib} MiB of memory found ({} MiB required)",
            ctx.config.memory
        )));
    }
    Ok(())
}

fn check_cpus(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let cpus = std::thread::available_parallelism()?.get();
    if cpus < ctx.config.cpus {
        return Err(CheckError::unmet(format!(
            "only {cpus} CPUs available ({} required)",
            ctx.config.cpus
        )));
    }
    Ok(())
}

fn check_disk_space(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let state_dir = ctx.config.state_dir();
    // The state directory may not exist before the first setup.
    let probe = state_dir
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("/"));
    let avail_gib = available_bytes(probe)? / (1024 * 1024 * 1024);
    if avail_gib < ctx.config.disk_size {
        return Err(CheckError::unmet(format!(
            "only {avail_gib} GiB free under {} ({} GiB required)",
            probe.display(),
            ctx.config.disk_size
        )));
    }
    Ok(())
}

fn remove_machines_dir(ctx: &CheckContext<'_>) -> Result<(), CheckError> {
    let dir = ctx.config.machines_dir();
    if dir.exists() {
        debug!("removing {}", dir.display());
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}

pub(crate) fn parse_mem_total_kib(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemTotal:")?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

fn available_bytes(path: &Path) -> std::io::Result<u64> {
    let c_path = std::ffi::CString::new(path.to_string_lossy().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // SAFETY: zeroed statvfs is a valid initial state for the struct.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: statvfs with a valid, NUL-terminated path and a properly
    // zeroed output struct is well-defined; the struct is only read after
    // the call succeeds.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stat) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreflightConfig;
    use crate::distro::DistroContext;
    use hostprep_exec::MockExecutor;

    fn with_ctx<T>(
        mock: &MockExecutor,
        config: &PreflightConfig,
        f: impl FnOnce(&CheckContext<'_>) -> T,
    ) -> T {
        let distro = DistroContext::unknown();
        let ctx = CheckContext {
            executor: mock,
            distro: &distro,
            config,
        };
        f(&ctx)
    }

    #[test]
    fn parses_mem_total() {
        let meminfo = "MemTotal:       32602860 kB\nMemFree:         1234 kB\n";
        assert_eq!(parse_mem_total_kib(meminfo), Some(32_602_860));
        assert_eq!(parse_mem_total_kib("MemFree: 1 kB\n"), None);
    }

    #[test]
    fn root_user_is_rejected() {
        let mock = MockExecutor::new();
        mock.push_ok("id", "0\n");
        let config = PreflightConfig::default();
        let err = with_ctx(&mock, &config, check_running_as_normal_user).unwrap_err();
        assert!(err.to_string().contains("root"));
    }

    #[test]
    fn normal_user_passes() {
        let mock = MockExecutor::new();
        mock.push_ok("id", "1000\n");
        let config = PreflightConfig::default();
        assert!(with_ctx(&mock, &config, check_running_as_normal_user).is_ok());
    }

    #[test]
    fn cpu_requirement_of_one_is_met() {
        let mock = MockExecutor::new();
        let config = PreflightConfig {
            cpus: 1,
            ..PreflightConfig::default()
        };
        assert!(with_ctx(&mock, &config, check_cpus).is_ok());
    }

    #[test]
    fn disk_check_with_zero_requirement_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockExecutor::new();
        let config = PreflightConfig {
            disk_size: 0,
            state_dir: dir.path().join("not-yet-created").to_string_lossy().into_owned(),
            ..PreflightConfig::default()
        };
        assert!(with_ctx(&mock, &config, check_disk_space).is_ok());
    }

    #[test]
    fn machines_dir_cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = PreflightConfig {
            state_dir: dir.path().to_string_lossy().into_owned(),
            ..PreflightConfig::default()
        };
        std::fs::create_dir_all(config.machines_dir().join("hostprep")).unwrap();
        let mock = MockExecutor::new();
        with_ctx(&mock, &config, remove_machines_dir).unwrap();
        assert!(!config.machines_dir().exists());
        with_ctx(&mock, &config, remove_machines_dir).unwrap();
    }
}
