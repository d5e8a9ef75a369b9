//! Static addressing, resolver and hosts-file setup for a fresh container.
//!
//! Every in-container step is a separate `exec` whose exit status is
//! checked on its own.

use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;
use crate::types::{InstanceDescriptor, ProvisioningOptions};
use crate::{Error, Hypervisor, Result};

pub const RESOLV_BASE: &str = "/etc/resolvconf/resolv.conf.d/base";
pub const HOSTS: &str = "/etc/hosts";
const ETH0_CFG: &str = "/etc/network/interfaces.d/eth0.cfg";
const PUBLIC_NAMESERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];
const LOOPBACK_HOST: &str = "127.0.1.1";
const HOSTS_MARKER: &str = "# ---- managed by kitchen-lxd ----";

/// Gateway used when none is configured.
const AUTO_GATEWAY: &str = "auto";

/// `raw.lxc` block giving eth0 a static address on `bridge`.
pub fn raw_lxc_network(ipv4: &str, gateway: Option<&str>, bridge: &str) -> String {
    let gateway = gateway.filter(|g| !g.is_empty()).unwrap_or(AUTO_GATEWAY);
    format!(
        "lxc.network.type = veth\n\
         lxc.network.name = eth0\n\
         lxc.network.link = {bridge}\n\
         lxc.network.ipv4 = {ipv4}\n\
         lxc.network.ipv4.gateway = {gateway}\n\
         lxc.network.flags = up"
    )
}

/// Nameservers to configure, in order.
///
/// Explicit servers win. Without them, statically addressed containers get
/// the gateway (when one is set) followed by public resolvers; DHCP
/// containers keep whatever the lease hands out.
pub fn nameservers(instance: &InstanceDescriptor) -> Vec<String> {
    if !instance.dns_servers.is_empty() {
        return instance.dns_servers.clone();
    }
    if instance.ipv4_address.is_none() {
        return Vec::new();
    }

    let mut servers = Vec::with_capacity(3);
    match instance.gateway_address.as_deref() {
        None | Some("") | Some(AUTO_GATEWAY) => {}
        Some(gateway) => servers.push(gateway.to_string()),
    }
    servers.extend(PUBLIC_NAMESERVERS.iter().map(|s| s.to_string()));
    servers
}

/// Contents of the resolvconf base file.
pub fn resolv_base(servers: &[String]) -> String {
    servers
        .iter()
        .map(|server| format!("nameserver {server}\n"))
        .collect()
}

/// Names mapped to 127.0.1.1: `name`, or `name.domain name`.
pub fn host_entry(instance: &InstanceDescriptor) -> String {
    match instance.domain_name.as_deref().filter(|d| !d.is_empty()) {
        Some(domain) => format!("{0}.{domain} {0}", instance.name),
        None => instance.name.clone(),
    }
}

/// Point 127.0.1.1 at `entry`.
///
/// When the file mentions 127.0.1.1, every line starting with it is
/// replaced. Otherwise a marker comment and a new line are appended.
pub fn rewrite_hosts(existing: &str, entry: &str) -> String {
    let line = format!("{LOOPBACK_HOST}\t{entry}");

    if existing.contains(LOOPBACK_HOST) {
        let mut out: String = existing
            .lines()
            .map(|l| if l.starts_with(LOOPBACK_HOST) { line.as_str() } else { l })
            .collect::<Vec<_>>()
            .join("\n");
        if existing.ends_with('\n') {
            out.push('\n');
        }
        return out;
    }

    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(HOSTS_MARKER);
    out.push('\n');
    out.push_str(&line);
    out.push('\n');
    out
}

/// Poll until `path` exists inside the container.
pub async fn wait_for_path<H: Hypervisor + ?Sized>(
    hypervisor: &H,
    name: &str,
    path: &str,
    retry: &RetryPolicy,
) -> Result<()> {
    debug!(container = name, path, "waiting for path");
    retry
        .await_condition(path, move || hypervisor.path_exists(name, path))
        .await?;
    debug!(container = name, path, "path available");
    Ok(())
}

/// Apply static addressing (if requested) and start the container.
pub async fn configure_start<H: Hypervisor + ?Sized>(
    hypervisor: &H,
    instance: &InstanceDescriptor,
    options: &ProvisioningOptions,
) -> Result<()> {
    let name = instance.name.as_str();

    if let Some(ipv4) = instance.ipv4_address.as_deref() {
        let block = raw_lxc_network(ipv4, instance.gateway_address.as_deref(), &options.bridge);
        debug!(container = name, ipv4, "setting static network config");
        hypervisor.set_raw_config(name, "lxc", &block).await?;
    }

    info!(container = name, "starting container");
    hypervisor.start(name).await?;

    if instance.ipv4_address.is_some() {
        match hypervisor
            .exec(name, &["sed", "-i", "s/dhcp/manual/g", ETH0_CFG], None)
            .await
        {
            Ok(_) => debug!(container = name, "disabled dhcp on eth0"),
            Err(Error::CommandFailed { stderr, .. }) => {
                warn!(container = name, %stderr, "could not disable dhcp in {ETH0_CFG}")
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Write resolver and hosts-file settings inside a running container.
pub async fn configure_dns<H: Hypervisor + ?Sized>(
    hypervisor: &H,
    instance: &InstanceDescriptor,
    retry: &RetryPolicy,
) -> Result<()> {
    let name = instance.name.as_str();

    let servers = nameservers(instance);
    if !servers.is_empty() {
        wait_for_path(hypervisor, name, RESOLV_BASE, retry).await?;
        debug!(container = name, servers = ?servers, "writing {RESOLV_BASE}");
        hypervisor
            .exec(name, &["tee", RESOLV_BASE], Some(&resolv_base(&servers)))
            .await?;
        hypervisor.exec(name, &["resolvconf", "-u"], None).await?;
    }

    wait_for_path(hypervisor, name, HOSTS, retry).await?;
    let existing = hypervisor.exec(name, &["cat", HOSTS], None).await?;
    let updated = rewrite_hosts(&existing, &host_entry(instance));
    if updated != existing {
        debug!(container = name, "updating {HOSTS}");
        hypervisor.exec(name, &["tee", HOSTS], Some(&updated)).await?;
    }

    Ok(())
}
