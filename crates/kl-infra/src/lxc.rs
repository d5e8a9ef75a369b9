use std::net::Ipv4Addr;
use std::path::Path;

use async_trait::async_trait;
use lxc_api::{CommandOutput, InitRequest, LxcClient};
use tracing::{debug, info};

use crate::{Error, Hypervisor, Result, StateProber};

/// Hypervisor backed by the `lxc` command-line tool.
///
/// State is read by scraping `lxc info`; all changes go through `lxc`
/// subcommands.
#[derive(Clone, Default)]
pub struct LxcHypervisor {
    client: LxcClient,
}

impl LxcHypervisor {
    pub fn new(client: LxcClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &LxcClient {
        &self.client
    }

    /// Fail with [`Error::CommandFailed`] on a non-zero exit.
    fn checked(output: CommandOutput) -> Result<CommandOutput> {
        if output.success() {
            return Ok(output);
        }
        Err(Error::CommandFailed {
            command: output.command,
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

#[async_trait]
impl StateProber for LxcHypervisor {
    async fn exists(&self, name: &str) -> Result<bool> {
        let found = self.client.info(name).await?.success();
        debug!(container = name, found, "lxc: existence check");
        Ok(found)
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        let info = Self::checked(self.client.info(name).await?)?;
        let status = lxc_api::parse_status(&info.stdout).ok_or_else(|| {
            Error::Parse(format!("`lxc info {name}` has no Status field"))
        })?;
        let running = status.eq_ignore_ascii_case("running");
        debug!(container = name, status, running, "lxc: status check");
        Ok(running)
    }

    async fn image_exists(&self, alias: &str) -> Result<bool> {
        let found = self.client.image_show(alias).await?.success();
        debug!(image = alias, found, "lxc: image check");
        Ok(found)
    }

    async fn ipv4_of(&self, name: &str, iface: &str) -> Result<Option<Ipv4Addr>> {
        let info = self.client.info(name).await?;
        if !info.success() {
            return Ok(None);
        }
        Ok(lxc_api::parse_ipv4(&info.stdout, iface))
    }

    async fn path_exists(&self, name: &str, path: &str) -> Result<bool> {
        let found = self.client.exec(name, &["ls", path], None).await?.success();
        debug!(container = name, path, found, "lxc: path check");
        Ok(found)
    }
}

#[async_trait]
impl Hypervisor for LxcHypervisor {
    async fn init(
        &self,
        image: &str,
        name: &str,
        profile: Option<&str>,
        config: Option<&str>,
    ) -> Result<()> {
        let req = InitRequest {
            image: image.into(),
            name: name.into(),
            profile: profile.map(str::to_string),
            config: config.map(str::to_string),
        };
        Self::checked(self.client.init(&req).await?)?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        Self::checked(self.client.start(name).await?)?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<()> {
        Self::checked(self.client.stop(name).await?)?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        Self::checked(self.client.delete(name).await?)?;
        Ok(())
    }

    async fn set_raw_config(&self, name: &str, subsystem: &str, value: &str) -> Result<()> {
        Self::checked(self.client.config_set_raw(name, subsystem, value).await?)?;
        Ok(())
    }

    async fn exec(&self, name: &str, command: &[&str], stdin: Option<&str>) -> Result<String> {
        let output = Self::checked(self.client.exec(name, command, stdin).await?)?;
        Ok(output.stdout)
    }

    async fn push_file(&self, local_path: &Path, name: &str, remote_path: &str) -> Result<()> {
        Self::checked(self.client.file_push(local_path, name, remote_path).await?)?;
        Ok(())
    }

    async fn import_image(&self, os: &str, release: &str, alias: &str) -> Result<()> {
        info!(
            "to watch progress, stop here and run: {}",
            self.client.import_command_line(os, release, alias)
        );
        Self::checked(self.client.import_image(os, release, alias).await?)?;
        Ok(())
    }
}
