use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use kl_infra::{Driver, LxcHypervisor, ProvisioningOptions, RetryPolicy};
use lxc_api::{CommandOutput, CommandRunner, LxcClient, render_command};
use tempfile::TempDir;

pub const PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2E kitchen@ci\n";

/// In-memory stand-in for the `lxc` and `lxd-images` binaries.
#[derive(Default)]
pub struct FakeLxc {
    world: Mutex<World>,
}

#[derive(Default)]
pub struct World {
    pub containers: BTreeMap<String, Container>,
    pub images: BTreeSet<String>,
    /// Every command line run, in order.
    pub log: Vec<String>,
    /// Number of `lxc info` calls on a running container before eth0 gets
    /// its address.
    pub dhcp_delay: u32,
    /// Number of `lxc file push` calls to reject before accepting.
    pub push_failures: u32,
    /// Command lines that exit non-zero.
    pub failing: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct Container {
    pub image: String,
    pub profile: Option<String>,
    pub config: Option<String>,
    pub running: bool,
    pub polls_since_start: u32,
    pub raw_lxc: Option<String>,
    pub files: BTreeMap<String, String>,
    pub dhcp_address: Ipv4Addr,
}

impl Container {
    fn address(&self) -> Ipv4Addr {
        self.raw_lxc
            .as_deref()
            .and_then(|raw| {
                raw.lines()
                    .find_map(|l| l.strip_prefix("lxc.network.ipv4 = "))
                    .map(|v| v.split('/').next().unwrap_or(v))
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(self.dhcp_address)
    }
}

pub fn ubuntu_files() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "/etc/hosts".to_string(),
            "127.0.0.1 localhost\n127.0.1.1 ubuntu\n".to_string(),
        ),
        ("/etc/resolvconf/resolv.conf.d/base".to_string(), String::new()),
        (
            "/etc/network/interfaces.d/eth0.cfg".to_string(),
            "auto eth0\niface eth0 inet dhcp\n".to_string(),
        ),
        ("/root/.ssh".to_string(), String::new()),
    ])
}

impl FakeLxc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    /// Commands run so far whose command line starts with `prefix`.
    pub fn calls(&self, prefix: &str) -> Vec<String> {
        self.world()
            .log
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn add_image(&self, alias: &str) {
        self.world().images.insert(alias.to_string());
    }

    /// Seed an already initialized container.
    pub fn add_container(&self, name: &str, running: bool) {
        let mut world = self.world();
        let index = world.containers.len() as u8;
        world.containers.insert(
            name.to_string(),
            Container {
                image: "preexisting".into(),
                profile: None,
                config: None,
                running,
                polls_since_start: 0,
                raw_lxc: None,
                files: ubuntu_files(),
                dhcp_address: Ipv4Addr::new(10, 0, 3, 100 + index),
            },
        );
    }

    pub fn container(&self, name: &str) -> Option<Container> {
        self.world().containers.get(name).cloned()
    }

    fn lxc(world: &mut World, args: &[String], stdin: Option<&str>) -> (i32, String) {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["info", name] => match world.containers.get_mut(*name) {
                None => (1, String::new()),
                Some(c) if !c.running => (0, format!("Name: {name}\nStatus: Stopped\n")),
                Some(c) => {
                    c.polls_since_start += 1;
                    let mut out = format!("Name: {name}\nStatus: Running\nIps:\n");
                    if c.polls_since_start > world.dhcp_delay {
                        out.push_str(&format!("  eth0:\tIPV4\t{}\n", c.address()));
                    }
                    out.push_str("  lo:\tIPV4\t127.0.0.1\n");
                    (0, out)
                }
            },
            ["image", "show", alias] => (i32::from(!world.images.contains(*alias)), String::new()),
            ["init", image, name, rest @ ..] => {
                if !world.images.contains(*image) || world.containers.contains_key(*name) {
                    return (1, String::new());
                }
                let flag = |f: &str| {
                    rest.iter()
                        .position(|a| *a == f)
                        .and_then(|i| rest.get(i + 1))
                        .map(|v| v.to_string())
                };
                let index = world.containers.len() as u8;
                world.containers.insert(
                    name.to_string(),
                    Container {
                        image: image.to_string(),
                        profile: flag("-p"),
                        config: flag("-c"),
                        running: false,
                        polls_since_start: 0,
                        raw_lxc: None,
                        files: ubuntu_files(),
                        dhcp_address: Ipv4Addr::new(10, 0, 3, 100 + index),
                    },
                );
                (0, String::new())
            }
            ["start", name] => match world.containers.get_mut(*name) {
                Some(c) if !c.running => {
                    c.running = true;
                    c.polls_since_start = 0;
                    (0, String::new())
                }
                _ => (1, String::new()),
            },
            ["stop", name] => match world.containers.get_mut(*name) {
                Some(c) if c.running => {
                    c.running = false;
                    (0, String::new())
                }
                _ => (1, String::new()),
            },
            ["delete", name] => {
                let stopped = world.containers.get(*name).is_some_and(|c| !c.running);
                if stopped {
                    world.containers.remove(*name);
                }
                (i32::from(!stopped), String::new())
            }
            ["config", "set", name, "raw.lxc", "-"] => match world.containers.get_mut(*name) {
                Some(c) if !c.running => {
                    c.raw_lxc = stdin.map(str::to_string);
                    (0, String::new())
                }
                _ => (1, String::new()),
            },
            ["exec", name, "--", command @ ..] => match world.containers.get_mut(*name) {
                Some(c) if c.running => Self::exec(c, command, stdin),
                _ => (1, String::new()),
            },
            ["file", "push", local, target] => {
                if world.push_failures > 0 {
                    world.push_failures -= 1;
                    return (1, String::new());
                }
                let Some((name, remote)) = target.split_once('/') else {
                    return (1, String::new());
                };
                let Ok(content) = std::fs::read_to_string(local) else {
                    return (1, String::new());
                };
                match world.containers.get_mut(name) {
                    Some(c) if c.running => {
                        c.files.insert(format!("/{remote}"), content);
                        (0, String::new())
                    }
                    _ => (1, String::new()),
                }
            }
            _ => (2, String::new()),
        }
    }

    fn exec(c: &mut Container, command: &[&str], stdin: Option<&str>) -> (i32, String) {
        match command {
            ["ls", path] => (i32::from(!c.files.contains_key(*path)), String::new()),
            ["cat", path] => match c.files.get(*path) {
                Some(content) => (0, content.clone()),
                None => (1, String::new()),
            },
            ["tee", path] => {
                let body = stdin.unwrap_or_default().to_string();
                c.files.insert(path.to_string(), body.clone());
                (0, body)
            }
            ["sed", "-i", "s/dhcp/manual/g", path] => match c.files.get_mut(*path) {
                Some(content) => {
                    *content = content.replace("dhcp", "manual");
                    (0, String::new())
                }
                None => (2, String::new()),
            },
            ["resolvconf", "-u"] => (0, String::new()),
            _ => (127, String::new()),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeLxc {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> lxc_api::Result<CommandOutput> {
        let command = render_command(program, args);

        let importing = program == "lxd-images";
        if importing {
            // Let other tasks interleave while the image downloads.
            tokio::task::yield_now().await;
        }

        let mut world = self.world();
        world.log.push(command.clone());

        let (exit_code, stdout) = if world.failing.contains(&command) {
            (1, String::new())
        } else if importing {
            match args {
                [import, _os, _release, flag, alias] if import == "import" && flag == "--alias" => {
                    world.images.insert(alias.clone());
                    (0, String::new())
                }
                _ => (2, String::new()),
            }
        } else {
            Self::lxc(&mut world, args, stdin)
        };

        let stderr = if exit_code == 0 {
            String::new()
        } else {
            format!("error: {command} failed")
        };
        Ok(CommandOutput {
            command,
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// A public key on disk plus options pointing at it.
pub struct Fixture {
    pub fake: Arc<FakeLxc>,
    pub options: ProvisioningOptions,
    _keys: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let keys = tempfile::tempdir().unwrap();
        let key: PathBuf = keys.path().join("id_rsa.pub");
        std::fs::write(&key, PUBLIC_KEY).unwrap();
        Self {
            fake: FakeLxc::new(),
            options: ProvisioningOptions::new(key),
            _keys: keys,
        }
    }

    pub fn driver(&self) -> Driver<LxcHypervisor> {
        self.driver_with(self.options.clone())
    }

    pub fn driver_with(&self, options: ProvisioningOptions) -> Driver<LxcHypervisor> {
        let client = LxcClient::with_runner(self.fake.clone());
        Driver::new(LxcHypervisor::new(client), options).with_retry(fast_retry())
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_interval(Duration::from_millis(1))
        .with_max_attempts(200)
}
