use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network transport between the host and the virtual machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Libvirt NAT network with host DNS forwarding.
    #[default]
    Default,
    /// Direct host-guest socket transport; no libvirt network is involved.
    Vsock,
}

impl NetworkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Vsock => "vsock",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "system" => Ok(Self::Default),
            "vsock" | "user" => Ok(Self::Vsock),
            other => Err(format!(
                "unknown network mode '{other}' (expected: default, vsock)"
            )),
        }
    }
}
