use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kl_infra::{InstanceDescriptor, ProvisioningOptions, RetryPolicy};

/// Provision disposable LXD containers for integration tests.
#[derive(Debug, Parser)]
#[command(name = "kitchen-lxd", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding one state file per instance.
    #[arg(long, global = true, env = "KITCHEN_STATE_DIR", default_value = ".kitchen")]
    pub state_dir: PathBuf,

    /// Hypervisor client binary.
    #[arg(long, global = true, env = "LXC_BIN", default_value = "lxc")]
    pub lxc_bin: String,

    /// Image import binary.
    #[arg(long, global = true, env = "LXD_IMAGES_BIN", default_value = "lxd-images")]
    pub import_bin: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create (or converge) the container and print its address.
    Create(InstanceArgs),
    /// Stop and delete the container.
    Destroy(InstanceArgs),
    /// Print the observed container state.
    Status(InstanceArgs),
}

impl Command {
    pub fn instance_args(&self) -> &InstanceArgs {
        match self {
            Self::Create(args) | Self::Destroy(args) | Self::Status(args) => args,
        }
    }
}

#[derive(Debug, Args)]
pub struct InstanceArgs {
    /// Container name.
    #[arg(long, env = "KITCHEN_INSTANCE_NAME")]
    pub name: String,

    /// Platform, e.g. `ubuntu-16.04` or `centos-7`.
    #[arg(long, env = "KITCHEN_PLATFORM", default_value = "ubuntu-14.04")]
    pub platform: String,

    #[arg(long, env = "KITCHEN_PROFILE")]
    pub profile: Option<String>,

    /// Config override passed to `lxc init -c`.
    #[arg(long, env = "KITCHEN_LXC_CONFIG")]
    pub lxc_config: Option<String>,

    /// Static IPv4 address for eth0; DHCP when unset.
    #[arg(long, env = "KITCHEN_IPV4")]
    pub ipv4: Option<String>,

    #[arg(long, env = "KITCHEN_IP_GATEWAY")]
    pub gateway: Option<String>,

    #[arg(long = "dns-server", env = "KITCHEN_DNS_SERVERS", value_delimiter = ',')]
    pub dns_servers: Vec<String>,

    #[arg(long, env = "KITCHEN_DOMAIN_NAME")]
    pub domain: Option<String>,

    /// Public key installed for root; defaults to the first key in ~/.ssh.
    #[arg(long, env = "KITCHEN_PUBLIC_KEY_PATH")]
    pub public_key_path: Option<PathBuf>,

    /// Image alias; defaults to the platform name.
    #[arg(long, env = "KITCHEN_IMAGE_NAME")]
    pub image_name: Option<String>,

    #[arg(long, env = "KITCHEN_IMAGE_OS")]
    pub image_os: Option<String>,

    #[arg(long, env = "KITCHEN_IMAGE_RELEASE")]
    pub image_release: Option<String>,

    /// Stop the container on destroy instead of deleting it.
    #[arg(long, env = "KITCHEN_STOP_INSTEAD_OF_DESTROY")]
    pub stop_instead_of_destroy: bool,

    /// Host bridge for statically addressed containers.
    #[arg(long, env = "KITCHEN_BRIDGE", default_value = ProvisioningOptions::DEFAULT_BRIDGE)]
    pub bridge: String,

    #[arg(long, env = "KITCHEN_POLL_INTERVAL_MS", default_value_t = 300)]
    pub poll_interval_ms: u64,

    /// Give up waiting after this many polls.
    #[arg(long, env = "KITCHEN_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Give up waiting after this many seconds per wait.
    #[arg(long, env = "KITCHEN_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
}

/// Everything the driver needs for one instance.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub instance: InstanceDescriptor,
    pub options: ProvisioningOptions,
    pub retry: RetryPolicy,
}

impl AppConfig {
    /// Resolve arguments, failing before any hypervisor call when no public
    /// key can be found.
    pub fn from_args(args: &InstanceArgs) -> kl_infra::Result<Self> {
        let public_key_path = kl_infra::default_public_key(args.public_key_path.as_deref())?;

        let instance = InstanceDescriptor {
            name: args.name.clone(),
            platform_name: args.platform.clone(),
            profile: args.profile.clone(),
            config: args.lxc_config.clone(),
            ipv4_address: args.ipv4.clone(),
            gateway_address: args.gateway.clone(),
            dns_servers: args.dns_servers.clone(),
            domain_name: args.domain.clone(),
        };

        let options = ProvisioningOptions {
            image_name: args.image_name.clone(),
            image_os: args.image_os.clone(),
            image_release: args.image_release.clone(),
            stop_instead_of_destroy: args.stop_instead_of_destroy,
            bridge: args.bridge.clone(),
            ..ProvisioningOptions::new(public_key_path)
        };

        let mut retry =
            RetryPolicy::default().with_interval(Duration::from_millis(args.poll_interval_ms));
        if let Some(attempts) = args.max_attempts {
            retry = retry.with_max_attempts(attempts);
        }
        if let Some(secs) = args.timeout_secs {
            retry = retry.with_max_elapsed(Duration::from_secs(secs));
        }

        Ok(Self {
            instance,
            options,
            retry,
        })
    }
}
