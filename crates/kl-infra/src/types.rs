use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Key files tried, relative to the home directory, when no public key path
/// is configured.
pub const PUBLIC_KEY_CANDIDATES: [&str; 4] = [
    ".ssh/id_rsa.pub",
    ".ssh/id_dsa.pub",
    ".ssh/identity.pub",
    ".ssh/id_ecdsa.pub",
];

/// Identity and network settings of one test container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Container name, unique on the host.
    pub name: String,
    /// Platform such as `ubuntu-16.04` or `centos-7`.
    pub platform_name: String,
    #[serde(default)]
    pub profile: Option<String>,
    /// Passed to `lxc init -c`.
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub ipv4_address: Option<String>,
    #[serde(default)]
    pub gateway_address: Option<String>,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
}

impl InstanceDescriptor {
    pub fn new(name: impl Into<String>, platform_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform_name: platform_name.into(),
            ..Default::default()
        }
    }
}

/// Resolved driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningOptions {
    pub public_key_path: PathBuf,
    /// Image alias; the platform name when unset.
    pub image_name: Option<String>,
    pub image_os: Option<String>,
    pub image_release: Option<String>,
    pub stop_instead_of_destroy: bool,
    /// Host bridge used for statically addressed containers.
    pub bridge: String,
}

impl ProvisioningOptions {
    pub const DEFAULT_BRIDGE: &'static str = "lxcbr0";

    pub fn new(public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            public_key_path: public_key_path.into(),
            image_name: None,
            image_os: None,
            image_release: None,
            stop_instead_of_destroy: false,
            bridge: Self::DEFAULT_BRIDGE.into(),
        }
    }

    /// Image alias the instance is initialized from.
    pub fn image_alias(&self, instance: &InstanceDescriptor) -> String {
        self.image_name
            .clone()
            .unwrap_or_else(|| instance.platform_name.clone())
    }
}

/// Pick the public key to install.
///
/// An explicit path must exist. Otherwise the first existing file of
/// [`PUBLIC_KEY_CANDIDATES`] under `home` wins.
pub fn resolve_public_key(explicit: Option<&Path>, home: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::Config(format!(
            "public key {} does not exist",
            path.display()
        )));
    }

    home.and_then(|home| {
        PUBLIC_KEY_CANDIDATES
            .iter()
            .map(|candidate| home.join(candidate))
            .find(|path| path.is_file())
    })
    .ok_or_else(|| {
        Error::Config("no public key found in ~/.ssh; set a public key path".into())
    })
}

/// Same as [`resolve_public_key`] using the current user's home directory.
pub fn default_public_key(explicit: Option<&Path>) -> Result<PathBuf> {
    resolve_public_key(explicit, dirs::home_dir().as_deref())
}

/// Observed container state. Always re-queried, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::Stopped => "stopped",
            Self::Running => "running",
        })
    }
}

/// Output record handed back to the caller between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Address the instance is reachable on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}
