use crate::network::NetworkMode;
use crate::PreflightError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "HOSTPREP_CONFIG";
pub const NETWORK_MODE_ENV: &str = "HOSTPREP_NETWORK_MODE";

pub const DEFAULT_MEMORY_MIB: u64 = 9216;
pub const DEFAULT_CPUS: usize = 4;
pub const DEFAULT_DISK_GIB: u64 = 31;
pub const DEFAULT_DRIVER_URL: &str = "https://github.com/marcoallegretti/hostprep-driver-libvirt/releases/download/v0.13.8/hostprep-driver-libvirt-amd64";

/// Persisted user settings for preflight runs.
///
/// ```toml
/// network-mode = "vsock"
/// memory = 12288
///
/// [skip]
/// check-ram = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PreflightConfig {
    pub network_mode: NetworkMode,
    /// Minimum host memory in MiB.
    pub memory: u64,
    pub cpus: usize,
    /// Minimum free disk space in GiB under the state directory.
    pub disk_size: u64,
    pub state_dir: String,
    pub driver_url: String,
    /// Checks disabled by the user, keyed by configuration key suffix.
    pub skip: BTreeMap<String, bool>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            network_mode: NetworkMode::Default,
            memory: DEFAULT_MEMORY_MIB,
            cpus: DEFAULT_CPUS,
            disk_size: DEFAULT_DISK_GIB,
            state_dir: "~/.hostprep".to_owned(),
            driver_url: DEFAULT_DRIVER_URL.to_owned(),
            skip: BTreeMap::new(),
        }
    }
}

impl PreflightConfig {
    pub fn load(path: &Path) -> Result<Self, PreflightError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PreflightError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| PreflightError::Config(format!("invalid {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn save(&self, path: &Path) -> Result<(), PreflightError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PreflightError::Config(format!("create {}: {e}", parent.display())))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PreflightError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| PreflightError::Config(format!("write {}: {e}", path.display())))
    }

    /// Load settings from `explicit`, `$HOSTPREP_CONFIG`, or the default
    /// location, in that order. Only the default location may be absent.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, PreflightError> {
        let mut config = if let Some(path) = explicit {
            Self::load(path)?
        } else if let Some(path) = std::env::var_os(CONFIG_ENV) {
            Self::load(Path::new(&path))?
        } else {
            match default_config_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                _ => Self::default(),
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), PreflightError> {
        if let Ok(mode) = std::env::var(NETWORK_MODE_ENV) {
            self.network_mode = mode.parse().map_err(PreflightError::Config)?;
        }
        Ok(())
    }

    pub fn should_skip(&self, config_key_suffix: &str) -> bool {
        self.skip.get(config_key_suffix).copied().unwrap_or(false)
    }

    pub fn state_dir(&self) -> PathBuf {
        expand_tilde(&self.state_dir)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.state_dir().join("bin")
    }

    pub fn machines_dir(&self) -> PathBuf {
        self.state_dir().join("machines")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir().join("cache")
    }
}

/// Configuration line (a dotted TOML key into the `[skip]` table) that
/// disables the check with `config_key_suffix`.
pub fn skip_setting(config_key_suffix: &str) -> String {
    format!("skip.{config_key_suffix}")
}

pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/hostprep/config.toml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
