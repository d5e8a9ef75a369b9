use std::sync::Arc;

use tracing::{debug, info};

use crate::image::{self, ImageLocks};
use crate::network;
use crate::retry::RetryPolicy;
use crate::types::{ContainerState, InstanceDescriptor, ProvisioningOptions, RunState};
use crate::{Error, Hypervisor, Result};

/// Interface whose address is reported as the instance hostname.
pub const PRIMARY_IFACE: &str = "eth0";
const SSH_DIR: &str = "/root/.ssh";
const AUTHORIZED_KEYS: &str = "/root/.ssh/authorized_keys";

/// Creates and destroys test containers.
///
/// Both operations converge from whatever state the container is in, so a
/// failed run is recovered by running the same operation again.
pub struct Driver<H> {
    hypervisor: H,
    options: ProvisioningOptions,
    retry: RetryPolicy,
    image_locks: Arc<ImageLocks>,
}

impl<H: Hypervisor> Driver<H> {
    pub fn new(hypervisor: H, options: ProvisioningOptions) -> Self {
        Self {
            hypervisor,
            options,
            retry: RetryPolicy::default(),
            image_locks: Arc::new(ImageLocks::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share an image lock table with other drivers in this process.
    pub fn with_image_locks(mut self, locks: Arc<ImageLocks>) -> Self {
        self.image_locks = locks;
        self
    }

    pub fn hypervisor(&self) -> &H {
        &self.hypervisor
    }

    pub fn options(&self) -> &ProvisioningOptions {
        &self.options
    }

    /// Observe the container's current state.
    pub async fn state(&self, instance: &InstanceDescriptor) -> Result<ContainerState> {
        let name = instance.name.as_str();
        if !self.hypervisor.exists(name).await? {
            return Ok(ContainerState::Absent);
        }
        if self.hypervisor.is_running(name).await? {
            Ok(ContainerState::Running)
        } else {
            Ok(ContainerState::Stopped)
        }
    }

    /// Bring the container to running, configured and reachable over SSH.
    ///
    /// Records the discovered address in `run_state.hostname`.
    pub async fn create(&self, instance: &InstanceDescriptor, run_state: &mut RunState) -> Result<()> {
        let name = instance.name.as_str();
        let mut state = self.state(instance).await?;
        debug!(container = name, %state, "observed container");

        if state == ContainerState::Absent {
            let image = image::ensure_image(
                &self.hypervisor,
                instance,
                &self.options,
                &self.image_locks,
            )
            .await?;
            info!(container = name, %image, "initializing container");
            self.hypervisor
                .init(
                    &image,
                    name,
                    instance.profile.as_deref(),
                    instance.config.as_deref(),
                )
                .await?;
            state = ContainerState::Stopped;
        }

        if state != ContainerState::Running {
            network::configure_start(&self.hypervisor, instance, &self.options).await?;
        }

        network::configure_dns(&self.hypervisor, instance, &self.retry).await?;

        info!(container = name, "waiting for network to become ready");
        let hypervisor = &self.hypervisor;
        let address = self
            .retry
            .await_value("an IPv4 address", move || hypervisor.ipv4_of(name, PRIMARY_IFACE))
            .await?;
        info!(container = name, %address, "container has an address");
        run_state.hostname = Some(address.to_string());

        self.install_public_key(instance).await
    }

    /// Stop and (unless configured to keep it) delete the container.
    ///
    /// Always clears `run_state.hostname`.
    pub async fn destroy(&self, instance: &InstanceDescriptor, run_state: &mut RunState) -> Result<()> {
        let name = instance.name.as_str();

        if self.hypervisor.exists(name).await? {
            if self.hypervisor.is_running(name).await? {
                info!(container = name, "stopping container");
                self.hypervisor.stop(name).await?;
            }
            if self.options.stop_instead_of_destroy {
                info!(container = name, "keeping stopped container");
            } else {
                info!(container = name, "deleting container");
                self.hypervisor.delete(name).await?;
            }
        } else {
            debug!(container = name, "container already absent");
        }

        run_state.hostname = None;
        Ok(())
    }

    async fn install_public_key(&self, instance: &InstanceDescriptor) -> Result<()> {
        let name = instance.name.as_str();
        let key = self.options.public_key_path.as_path();
        info!(container = name, key = %key.display(), "setting up public key");

        network::wait_for_path(&self.hypervisor, name, SSH_DIR, &self.retry).await?;

        // The push itself can fail while the container is still settling.
        let hypervisor = &self.hypervisor;
        self.retry
            .await_condition("the public key upload", move || async move {
                match hypervisor.push_file(key, name, AUTHORIZED_KEYS).await {
                    Ok(()) => Ok(true),
                    Err(Error::CommandFailed { stderr, .. }) => {
                        debug!(container = name, %stderr, "key upload failed, retrying");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;

        debug!(container = name, "public key installed");
        Ok(())
    }
}
