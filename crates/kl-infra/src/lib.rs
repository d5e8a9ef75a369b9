pub mod driver;
pub mod image;
pub mod lxc;
pub mod network;
pub mod retry;
pub mod types;

use std::net::Ipv4Addr;
use std::path::Path;

use async_trait::async_trait;

pub use driver::Driver;
pub use image::{ImageLocks, ImageRef};
pub use lxc::LxcHypervisor;
pub use retry::RetryPolicy;
pub use types::{
    ContainerState, InstanceDescriptor, ProvisioningOptions, RunState, default_public_key,
    resolve_public_key,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("`{command}` failed (exit {code}): {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("timed out after {attempts} attempts waiting for {what}")]
    Timeout { what: String, attempts: u32 },

    #[error("unexpected hypervisor output: {0}")]
    Parse(String),

    #[error("lxc error: {0}")]
    Lxc(#[from] lxc_api::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Read-only queries against the hypervisor.
///
/// Implementations may be called arbitrarily often; each call re-derives
/// the answer from the hypervisor.
#[async_trait]
pub trait StateProber: Send + Sync + 'static {
    /// Whether a container with this name exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Whether the container reports itself as running.
    ///
    /// Only meaningful for containers that exist.
    async fn is_running(&self, name: &str) -> Result<bool>;

    /// Whether the image alias is known to the hypervisor.
    async fn image_exists(&self, alias: &str) -> Result<bool>;

    /// IPv4 address currently assigned to `iface`, if any.
    async fn ipv4_of(&self, name: &str, iface: &str) -> Result<Option<Ipv4Addr>>;

    /// Whether `path` exists inside the running container.
    async fn path_exists(&self, name: &str, path: &str) -> Result<bool>;
}

/// State-changing hypervisor operations.
///
/// Every method fails with [`Error::CommandFailed`] when the hypervisor
/// rejects the request.
#[async_trait]
pub trait Hypervisor: StateProber {
    async fn init(
        &self,
        image: &str,
        name: &str,
        profile: Option<&str>,
        config: Option<&str>,
    ) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;

    /// Set the raw `subsystem` configuration block of a stopped container.
    async fn set_raw_config(&self, name: &str, subsystem: &str, value: &str) -> Result<()>;

    /// Run a command inside the container and return its stdout.
    async fn exec(&self, name: &str, command: &[&str], stdin: Option<&str>) -> Result<String>;

    /// Copy a local file into the container.
    async fn push_file(&self, local_path: &Path, name: &str, remote_path: &str) -> Result<()>;

    /// Import `os`/`release` under `alias`. Long-running.
    async fn import_image(&self, os: &str, release: &str, alias: &str) -> Result<()>;
}
