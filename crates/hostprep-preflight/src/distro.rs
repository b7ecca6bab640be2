use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const FEDORA: &str = "fedora";
pub const UBUNTU: &str = "ubuntu";
pub const DEBIAN: &str = "debian";
pub const SUSE: &str = "suse";
pub const UNKNOWN: &str = "unknown";

/// Environment variable pointing the probe at a different os-release file.
pub const OS_RELEASE_ENV: &str = "HOSTPREP_OS_RELEASE";

const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

/// Identity of the host distribution as declared by os-release(5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroContext {
    pub id: String,
    pub version_id: String,
    /// Distributions this one declares itself compatible with, most specific first.
    pub id_like: Vec<String>,
    pub pretty_name: Option<String>,
}

impl DistroContext {
    /// Sentinel used when the host cannot be fingerprinted.
    pub fn unknown() -> Self {
        Self {
            id: UNKNOWN.to_owned(),
            version_id: String::new(),
            id_like: Vec::new(),
            pretty_name: None,
        }
    }

    pub fn new(id: &str, version_id: &str, id_like: &[&str]) -> Self {
        Self {
            id: id.to_owned(),
            version_id: version_id.to_owned(),
            id_like: id_like.iter().map(|s| (*s).to_owned()).collect(),
            pretty_name: None,
        }
    }

    /// Parse the contents of an os-release file.
    pub fn parse(content: &str) -> Self {
        let mut ctx = Self {
            // os-release(5): ID defaults to "linux" when unset.
            id: "linux".to_owned(),
            ..Self::unknown()
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(raw.trim());
            match key.trim() {
                "ID" => ctx.id = value,
                "VERSION_ID" => ctx.version_id = value,
                "ID_LIKE" => {
                    ctx.id_like = value.split_whitespace().map(str::to_owned).collect();
                }
                "PRETTY_NAME" => ctx.pretty_name = Some(value),
                _ => {}
            }
        }
        ctx
    }

    pub fn id_like(&self) -> &[String] {
        &self.id_like
    }

    /// True when this distribution is `family` or declares itself like it.
    pub fn is_like(&self, family: &str) -> bool {
        self.id == family || self.id_like.iter().any(|id| id == family)
    }

    pub fn display_name(&self) -> String {
        match &self.pretty_name {
            Some(name) => name.clone(),
            None if self.version_id.is_empty() => self.id.clone(),
            None => format!("{} {}", self.id, self.version_id),
        }
    }
}

/// True if `ctx` is `family` or declares itself like `family`. No context
/// matches nothing.
pub fn matches_family(ctx: Option<&DistroContext>, family: &str) -> bool {
    ctx.is_some_and(|c| c.is_like(family))
}

/// Compare two VERSION_ID values.
///
/// Leading numeric components are compared as numbers so that "9" sorts
/// below "33". When either side has no numeric prefix the raw strings are
/// compared instead.
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    match (leading_number(version), leading_number(minimum)) {
        (Some(v), Some(m)) => v >= m,
        _ => version >= minimum,
    }
}

fn leading_number(version: &str) -> Option<u32> {
    let digits: String = version.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn unquote(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'' {
        return raw[1..raw.len() - 1].to_owned();
    }
    if !(bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"') {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw[1..raw.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\' | '$' | '`')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn read_os_release(path: &Path) -> std::io::Result<DistroContext> {
    let content = std::fs::read_to_string(path)?;
    Ok(DistroContext::parse(&content))
}

/// Fingerprint the host distribution.
///
/// Never fails: when no os-release file can be read the sentinel
/// `unknown` context is returned and a warning is logged, so callers still
/// get a generic check set.
pub fn detect_context() -> DistroContext {
    let candidates: Vec<PathBuf> = match std::env::var_os(OS_RELEASE_ENV) {
        Some(path) => vec![PathBuf::from(path)],
        None => OS_RELEASE_PATHS.iter().map(PathBuf::from).collect(),
    };
    detect_context_from(&candidates)
}

pub fn detect_context_from(candidates: &[PathBuf]) -> DistroContext {
    let mut last_err = None;
    for path in candidates {
        match read_os_release(path) {
            Ok(ctx) => {
                debug!(
                    "detected distribution {} {} (like: {:?})",
                    ctx.id, ctx.version_id, ctx.id_like
                );
                return ctx;
            }
            Err(e) => last_err = Some(format!("{}: {e}", path.display())),
        }
    }
    warn!(
        "cannot get distribution name: {}",
        last_err.unwrap_or_else(|| "no os-release file".to_owned())
    );
    DistroContext::unknown()
}
