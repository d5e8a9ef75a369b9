//! Resolving a platform name to an image alias, importing it when missing.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::types::{InstanceDescriptor, ProvisioningOptions};
use crate::{Hypervisor, Result};

/// Image server coordinates for an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub os: String,
    pub release: String,
}

impl ImageRef {
    /// Derive the image from a platform name such as `ubuntu-16.04`.
    ///
    /// The name is split on its first hyphen. Ubuntu releases given as a
    /// version number are mapped to their codename; everything else passes
    /// through.
    pub fn from_platform(platform_name: &str) -> Self {
        let (os, release) = platform_name
            .split_once('-')
            .unwrap_or((platform_name, ""));

        let release = if os.eq_ignore_ascii_case("ubuntu") {
            ubuntu_codename(release).unwrap_or(release)
        } else {
            release
        };

        Self {
            os: os.to_string(),
            release: release.to_string(),
        }
    }
}

fn ubuntu_codename(release: &str) -> Option<&'static str> {
    let codename = match release.to_ascii_lowercase().as_str() {
        "14.04" | "1404" | "trusty" | "" => "trusty",
        "14.10" | "1410" | "utopic" => "utopic",
        "15.04" | "1504" | "vivid" => "vivid",
        "15.10" | "1510" | "wily" => "wily",
        "16.04" | "1604" | "xenial" => "xenial",
        _ => return None,
    };
    Some(codename)
}

/// Per-alias locks around the check-then-import sequence.
///
/// Image aliases are global to the hypervisor. Drivers provisioning
/// concurrently in one process must share a single table, otherwise two of
/// them can import the same alias at once.
#[derive(Debug, Default)]
pub struct ImageLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ImageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the lock for `alias` until the guard drops.
    ///
    /// Entries nobody holds or waits on are pruned here, so the table only
    /// keeps aliases that are in use.
    pub async fn acquire(&self, alias: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(alias.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Make sure the instance's image alias exists and return it.
///
/// An existing alias is never re-imported.
pub async fn ensure_image<H: Hypervisor + ?Sized>(
    hypervisor: &H,
    instance: &InstanceDescriptor,
    options: &ProvisioningOptions,
    locks: &ImageLocks,
) -> Result<String> {
    let alias = options.image_alias(instance);
    let _guard = locks.acquire(&alias).await;

    if hypervisor.image_exists(&alias).await? {
        debug!(image = %alias, "image exists");
        return Ok(alias);
    }

    let derived = ImageRef::from_platform(&instance.platform_name);
    let os = options.image_os.clone().unwrap_or(derived.os);
    let release = options.image_release.clone().unwrap_or(derived.release);

    info!(image = %alias, %os, %release, "image missing, importing; this may take a while");
    hypervisor.import_image(&os, &release, &alias).await?;
    info!(image = %alias, "image imported");

    Ok(alias)
}
