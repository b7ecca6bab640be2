//! CLI subprocess integration tests.
//!
//! These tests invoke the `hostprep` binary with a fake os-release file and
//! an explicit configuration, and only exercise commands that do not touch
//! the host.

use std::path::{Path, PathBuf};
use std::process::Command;

const FEDORA_38: &str = r#"NAME="Fedora Linux"
VERSION_ID=38
ID=fedora
PRETTY_NAME="Fedora Linux 38 (Workstation Edition)"
"#;

const FEDORA_25: &str = "ID=fedora\nVERSION_ID=25\n";

const UBUNTU: &str = r#"NAME="Ubuntu"
ID=ubuntu
ID_LIKE=debian
VERSION_ID="22.04"
"#;

struct Host {
    dir: tempfile::TempDir,
}

impl Host {
    fn new(os_release: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("os-release"), os_release).unwrap();
        std::fs::write(dir.path().join("config.toml"), "").unwrap();
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn write_config(&self, content: &str) {
        std::fs::write(self.config_path(), content).unwrap();
    }

    fn hostprep(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_hostprep"));
        cmd.env("HOSTPREP_OS_RELEASE", self.dir.path().join("os-release"))
            .env("HOSTPREP_CONFIG", self.config_path())
            .env_remove("HOSTPREP_NETWORK_MODE")
            .env_remove("HOSTPREP_LOG");
        cmd
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn checks_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn config_keys(value: &serde_json::Value) -> Vec<String> {
    value["checks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["config_key"].as_str())
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect()
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_hostprep"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hostprep"));
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_hostprep"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["setup", "check", "cleanup", "checks"] {
        assert!(stdout.contains(cmd), "help missing '{cmd}'");
    }
}

#[test]
fn cli_checks_json_fedora_uses_resolved() {
    let host = Host::new(FEDORA_38);
    let value = checks_json(host.hostprep().args(["checks", "--json"]));
    assert_eq!(value["distro"]["id"], "fedora");
    assert_eq!(value["network_mode"], "default");
    let keys = config_keys(&value);
    assert_eq!(keys[0], "check-root-user");
    assert!(keys.contains(&"check-systemd-resolved-running".to_owned()));
    assert!(keys.contains(&"check-libvirt-network".to_owned()));
    assert!(!keys.contains(&"check-dnsmasq-file".to_owned()));
    assert!(!keys.contains(&"check-vsock".to_owned()));
}

#[test]
fn cli_checks_json_old_fedora_uses_dnsmasq() {
    let host = Host::new(FEDORA_25);
    let keys = config_keys(&checks_json(host.hostprep().args(["checks", "--json"])));
    assert!(keys.contains(&"check-dnsmasq-file".to_owned()));
    assert!(!keys.contains(&"check-systemd-resolved-running".to_owned()));
}

#[test]
fn cli_checks_json_ubuntu_includes_apparmor() {
    let host = Host::new(UBUNTU);
    let keys = config_keys(&checks_json(host.hostprep().args(["checks", "--json"])));
    assert!(keys.contains(&"check-apparmor-profile-setup".to_owned()));
    assert!(keys.contains(&"check-systemd-resolved-running".to_owned()));
}

#[test]
fn cli_network_mode_flag_overrides_config() {
    let host = Host::new(FEDORA_38);
    host.write_config("network-mode = \"default\"\n");
    let value = checks_json(
        host.hostprep()
            .args(["checks", "--json", "--network-mode", "vsock"]),
    );
    assert_eq!(value["network_mode"], "vsock");
    let keys = config_keys(&value);
    assert!(keys.contains(&"check-vsock".to_owned()));
    assert!(!keys.contains(&"check-libvirt-network".to_owned()));
    assert!(!keys.contains(&"check-network-manager-installed".to_owned()));
}

#[test]
fn cli_network_mode_from_config() {
    let host = Host::new(FEDORA_38);
    host.write_config("network-mode = \"vsock\"\n");
    let value = checks_json(host.hostprep().args(["checks", "--json"]));
    assert_eq!(value["network_mode"], "vsock");
}

#[test]
fn cli_checks_all_covers_both_modes() {
    let host = Host::new(FEDORA_38);
    let keys = config_keys(&checks_json(
        host.hostprep().args(["checks", "--all", "--json"]),
    ));
    assert!(keys.contains(&"check-vsock".to_owned()));
    assert!(keys.contains(&"check-libvirt-network".to_owned()));
}

#[test]
fn cli_checks_reports_skipped() {
    let host = Host::new(FEDORA_38);
    host.write_config("[skip]\ncheck-ram = true\n");
    let value = checks_json(host.hostprep().args(["checks", "--json"]));
    let ram = value["checks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["config_key"] == "check-ram")
        .unwrap();
    assert_eq!(ram["skipped"], true);
    assert_eq!(ram["skip_setting"], "skip.check-ram");
}

#[test]
fn cli_printed_setting_round_trips_through_config() {
    let host = Host::new(FEDORA_38);
    let value = checks_json(host.hostprep().args(["checks", "--json"]));
    let setting = value["checks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["config_key"] == "check-libvirt-version")
        .and_then(|c| c["skip_setting"].as_str())
        .unwrap()
        .to_owned();

    host.write_config(&format!("{setting} = true\n"));
    let value = checks_json(host.hostprep().args(["checks", "--json"]));
    let skipped: Vec<_> = value["checks"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["skipped"] == true)
        .map(|c| c["config_key"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(skipped, vec!["check-libvirt-version"]);
}

#[test]
fn cli_unknown_config_key_exits_with_config_error() {
    let host = Host::new(FEDORA_38);
    host.write_config("skip-check-ram = true\n");
    let output = host.hostprep().arg("checks").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_checks_text_lists_settings() {
    let host = Host::new(FEDORA_38);
    let output = host.hostprep().arg("checks").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Fedora Linux 38"));
    assert!(stdout.contains("skip.check-libvirt-running"));
}

#[test]
fn cli_unknown_distro_still_lists_checks() {
    let host = Host::new(FEDORA_38);
    let missing = host.path().join("missing-os-release");
    let value = checks_json(
        host.hostprep()
            .env("HOSTPREP_OS_RELEASE", &missing)
            .args(["checks", "--json"]),
    );
    assert_eq!(value["distro"]["id"], "unknown");
    assert!(!config_keys(&value).is_empty());
}

#[test]
fn cli_invalid_config_exits_with_config_error() {
    let host = Host::new(FEDORA_38);
    host.write_config("memory = \"lots\"\n");
    let output = host.hostprep().arg("checks").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("config error"));
}

#[test]
fn cli_missing_explicit_config_exits_with_config_error() {
    let host = Host::new(FEDORA_38);
    let output = host
        .hostprep()
        .args(["checks", "--config"])
        .arg(host.path().join("nope.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_cleanup_requires_force_when_not_interactive() {
    let host = Host::new(FEDORA_38);
    let output = host.hostprep().arg("cleanup").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--force"));
}
