//! OrangeFS parallel filesystem
//!
//! Every host of the hostfile acts as client, data server and metadata
//! server. Configure generates the filesystem config on the controlling
//! host, distributes it with the host lists and the client `pvfs2tab`, and
//! formats server storage. How clients attach depends on `ofs_mode`:
//!
//! | mode   | start                                   | stop                       |
//! |--------|-----------------------------------------|----------------------------|
//! | `fuse` | servers, then `pvfs2fuse` on clients    | `fusermount -u`, servers   |
//! | `ares` | servers, client daemon, user mount      | lazy unmount, kill daemons |
//! | `kern` | servers, kernel module, sudo mount      | sudo unmount, kill daemons |

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use corral_core::{Env, Error, HostGroup, ResourceGraph, Result};
use corral_dispatch::{CommandTemplate, DispatchStep};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::package::{Package, PackageContext};
use crate::schema::{ConfigurationOption, ConfigurationSchema, OptionType, ResolvedConfig};

pub const PACKAGE_TYPE: &str = "orangefs";

/// Env var pointing at the OrangeFS install prefix
pub const ORANGEFS_PATH: &str = "ORANGEFS_PATH";

const CLIENT: &str = "client";
const SERVER: &str = "server";
const METADATA: &str = "metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Ib,
}

impl Protocol {
    fn port_flag(self) -> &'static str {
        match self {
            Protocol::Tcp => "--tcpport",
            Protocol::Ib => "--ibport",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Ib => write!(f, "ib"),
        }
    }
}

/// How clients attach to the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfsMode {
    Fuse,
    Ares,
    Kern,
}

impl OfsMode {
    pub fn strategy(self) -> &'static dyn ModeStrategy {
        match self {
            OfsMode::Fuse => &FuseMode,
            OfsMode::Ares => &AresMode,
            OfsMode::Kern => &KernMode,
        }
    }
}

/// Menu options, as resolved
#[derive(Debug, Clone, Deserialize)]
pub struct OrangefsOptions {
    pub port: u16,
    pub ofs_data_dir: String,
    pub stripe_size: u64,
    pub stripe_dist: String,
    pub protocol: Protocol,
    pub mount: String,
    pub name: String,
    pub sudoenv: bool,
    pub ofs_mode: OfsMode,
}

/// Hosts and paths fixed at configure time and persisted in the config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub client_host_set: Vec<String>,
    pub server_host_set: Vec<String>,
    pub md_host_set: Vec<String>,
    pub client_hosts_path: PathBuf,
    pub server_hosts_path: PathBuf,
    pub metadata_hosts_path: PathBuf,
    pub pfs_conf: PathBuf,
    pub pvfs2tab: PathBuf,
    pub storage: PathBuf,
    pub metadata: PathBuf,
    pub log: PathBuf,
    pub client_log: PathBuf,
}

impl Layout {
    fn new(opts: &OrangefsOptions, private_dir: &Path, hosts: &[String]) -> Self {
        let data_dir = PathBuf::from(&opts.ofs_data_dir);
        Self {
            client_host_set: hosts.to_vec(),
            server_host_set: hosts.to_vec(),
            md_host_set: hosts.to_vec(),
            client_hosts_path: private_dir.join("client_hosts"),
            server_hosts_path: private_dir.join("server_hosts"),
            metadata_hosts_path: private_dir.join("metadata_hosts"),
            pfs_conf: private_dir.join("orangefs.xml"),
            pvfs2tab: private_dir.join("pvfs2tab"),
            storage: data_dir.join("orangefs_storage"),
            metadata: data_dir.join("orangefs_metadata"),
            log: private_dir.join("orangefs_server.log"),
            client_log: private_dir.join("orangefs_client.log"),
        }
    }

    fn groups(&self) -> Vec<HostGroup> {
        vec![
            HostGroup::new(CLIENT, self.client_host_set.clone()),
            HostGroup::new(SERVER, self.server_host_set.clone()),
            HostGroup::new(METADATA, self.md_host_set.clone()),
        ]
    }
}

/// A configured deployment, rebuilt from persisted config for each call
pub struct Deployment<'a> {
    pub opts: OrangefsOptions,
    pub layout: Layout,
    pub clients: &'a HostGroup,
    pub servers: &'a HostGroup,
    pub metadata: &'a HostGroup,
    pub env: &'a Env,
}

impl<'a> Deployment<'a> {
    fn from_context(ctx: &'a PackageContext<'_>) -> Result<Self> {
        Ok(Self {
            opts: ctx.config.to_typed()?,
            layout: ctx.config.to_typed()?,
            clients: ctx.group(CLIENT)?,
            servers: ctx.group(SERVER)?,
            metadata: ctx.group(METADATA)?,
            env: &ctx.env,
        })
    }

    /// `<protocol>://<first metadata host>:<port>/<name>`
    pub fn fs_spec(&self) -> Result<String> {
        let md = self
            .metadata
            .first()
            .ok_or_else(|| Error::invalid_config("orangefs has no metadata hosts"))?;
        Ok(format!(
            "{}://{}:{}/{}",
            self.opts.protocol, md, self.opts.port, self.opts.name
        ))
    }

    /// Path of an OrangeFS tool, under `ORANGEFS_PATH` when it is set
    fn tool(&self, dir: &str, name: &str) -> String {
        match self.env.get(ORANGEFS_PATH) {
            Some(prefix) => format!("{}/{}/{}", prefix.trim_end_matches('/'), dir, name),
            None => name.to_string(),
        }
    }

    fn sudo(&self) -> String {
        if self.opts.sudoenv {
            "sudo -E ".to_string()
        } else {
            format!("sudo env PVFS2TAB_FILE={} ", self.layout.pvfs2tab.display())
        }
    }

    fn start_servers(&self) -> Result<DispatchStep> {
        let template = CommandTemplate::new(format!(
            "{} {{{{ pfs_conf }}}} -a {{{{ host }}}}",
            self.tool("sbin", "pvfs2-server")
        ))
        .with_var("pfs_conf", &self.layout.pfs_conf)?;
        Ok(DispatchStep::run(self.servers, template, self.env))
    }

    fn stop_servers(&self) -> DispatchStep {
        DispatchStep::run(self.servers, "pkill -f pvfs2-server || true", self.env)
    }

    fn start_client_daemon(&self, prefix: &str) -> DispatchStep {
        let command = format!(
            "{}{} -p {} -L {}",
            prefix,
            self.tool("sbin", "pvfs2-client"),
            self.tool("sbin", "pvfs2-client-core"),
            self.layout.client_log.display()
        );
        DispatchStep::run(self.clients, command, self.env)
    }

    fn on_clients(&self, command: String) -> DispatchStep {
        DispatchStep::run(self.clients, command, self.env)
    }
}

/// Start and stop behavior for one `ofs_mode`
pub trait ModeStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn start_steps(&self, d: &Deployment<'_>) -> Result<Vec<DispatchStep>>;
    fn stop_steps(&self, d: &Deployment<'_>) -> Result<Vec<DispatchStep>>;
}

pub struct FuseMode;
pub struct AresMode;
pub struct KernMode;

impl ModeStrategy for FuseMode {
    fn name(&self) -> &'static str {
        "fuse"
    }

    fn start_steps(&self, d: &Deployment<'_>) -> Result<Vec<DispatchStep>> {
        Ok(vec![
            d.start_servers()?,
            d.on_clients(format!(
                "{} {} -o fs_spec={}",
                d.tool("bin", "pvfs2fuse"),
                d.opts.mount,
                d.fs_spec()?
            )),
        ])
    }

    fn stop_steps(&self, d: &Deployment<'_>) -> Result<Vec<DispatchStep>> {
        Ok(vec![
            d.on_clients(format!("fusermount -u {} || true", d.opts.mount)),
            d.stop_servers(),
        ])
    }
}

impl ModeStrategy for AresMode {
    fn name(&self) -> &'static str {
        "ares"
    }

    fn start_steps(&self, d: &Deployment<'_>) -> Result<Vec<DispatchStep>> {
        Ok(vec![
            d.start_servers()?,
            d.start_client_daemon(""),
            d.on_clients(format!("mount -t pvfs2 {} {}", d.fs_spec()?, d.opts.mount)),
        ])
    }

    fn stop_steps(&self, d: &Deployment<'_>) -> Result<Vec<DispatchStep>> {
        Ok(vec![
            d.on_clients(format!("umount -l {} || true", d.opts.mount)),
            d.on_clients("pkill -9 -f pvfs2-client || true".to_string()),
            d.stop_servers(),
        ])
    }
}

impl ModeStrategy for KernMode {
    fn name(&self) -> &'static str {
        "kern"
    }

    fn start_steps(&self, d: &Deployment<'_>) -> Result<Vec<DispatchStep>> {
        let sudo = d.sudo();
        Ok(vec![
            d.start_servers()?,
            d.on_clients(format!("{}modprobe orangefs", sudo)),
            d.start_client_daemon(&sudo),
            d.on_clients(format!(
                "{}mount -t pvfs2 {} {}",
                sudo,
                d.fs_spec()?,
                d.opts.mount
            )),
        ])
    }

    fn stop_steps(&self, d: &Deployment<'_>) -> Result<Vec<DispatchStep>> {
        let sudo = d.sudo();
        Ok(vec![
            d.on_clients(format!("{}umount {} || true", sudo, d.opts.mount)),
            d.on_clients(format!("{}pkill -f pvfs2-client || true", sudo)),
            d.stop_servers(),
        ])
    }
}

/// Fail unless every server has a known filesystem holding `data_dir`
///
/// Skipped when no resource graph has been built.
fn check_storage(graph: &ResourceGraph, servers: &HostGroup, data_dir: &str) -> Result<()> {
    if graph.is_empty() {
        debug!("No resource graph; skipping storage check for {}", data_dir);
        return Ok(());
    }
    for host in servers.iter() {
        if graph.find_mount(host, data_dir).is_none() {
            return Err(Error::missing_resource(format!(
                "no filesystem on {} holds ofs_data_dir {}",
                host, data_dir
            )));
        }
    }
    Ok(())
}

fn genconfig_command(opts: &OrangefsOptions, layout: &Layout, tool: &str) -> String {
    [
        tool.to_string(),
        "--quiet".to_string(),
        format!("--protocol {}", opts.protocol),
        format!("{} {}", opts.protocol.port_flag(), opts.port),
        format!("--dist-name {}", opts.stripe_dist),
        format!("--dist-params \"strip_size: {}\"", opts.stripe_size),
        format!("--ioservers {}", layout.server_host_set.join(",")),
        format!("--metaservers {}", layout.md_host_set.join(",")),
        format!("--storage {}", layout.storage.display()),
        format!("--metadata {}", layout.metadata.display()),
        format!("--logfile {}", layout.log.display()),
        format!("--fsname {}", opts.name),
        layout.pfs_conf.display().to_string(),
    ]
    .join(" ")
}

fn pvfs2tab_line(opts: &OrangefsOptions, md_host: &str) -> String {
    format!(
        "{}://{}:{}/{} {} pvfs2 defaults,auto 0 0\n",
        opts.protocol, md_host, opts.port, opts.name, opts.mount
    )
}

/// The OrangeFS package
pub struct Orangefs;

pub fn factory() -> Box<dyn Package> {
    Box::new(Orangefs)
}

#[async_trait]
impl Package for Orangefs {
    fn class_name(&self) -> &str {
        "Orangefs"
    }

    fn configure_menu(&self) -> ConfigurationSchema {
        ConfigurationSchema::default()
            .option(
                ConfigurationOption::new("port", OptionType::Int)
                    .with_description("The port to listen for data on")
                    .with_default(3334),
            )
            .option(
                ConfigurationOption::new("ofs_data_dir", OptionType::Str).with_description(
                    "The mount point to place all OFS data. Must not be a shared filesystem",
                ),
            )
            .option(
                ConfigurationOption::new("stripe_size", OptionType::Int)
                    .with_description("The stripe size")
                    .with_default(65536),
            )
            .option(
                ConfigurationOption::new("stripe_dist", OptionType::Str)
                    .with_description("The striping distribution algorithm")
                    .with_default("simple_stripe"),
            )
            .option(
                ConfigurationOption::new("protocol", OptionType::Str)
                    .with_description("The network protocol")
                    .with_default("tcp")
                    .with_choices(["tcp", "ib"]),
            )
            .option(
                ConfigurationOption::new("mount", OptionType::Str)
                    .with_description("Where to mount orangefs clients")
                    .with_default("${private_dir}/client"),
            )
            .option(
                ConfigurationOption::new("name", OptionType::Str)
                    .with_description("The name of the orangefs installation")
                    .with_default("orangefs"),
            )
            .option(
                ConfigurationOption::new("sudoenv", OptionType::Bool)
                    .with_description("Whether sudo forwards the environment")
                    .with_default(true),
            )
            .option(
                ConfigurationOption::new("ofs_mode", OptionType::Str)
                    .with_description("How clients attach to the filesystem")
                    .with_default("ares")
                    .with_choices(["fuse", "ares", "kern"]),
            )
    }

    fn host_groups(&self, config: &ResolvedConfig) -> Result<Vec<HostGroup>> {
        if !config.contains_key("client_host_set") {
            return Ok(Vec::new());
        }
        let layout: Layout = config.to_typed()?;
        Ok(layout.groups())
    }

    async fn configure(&self, ctx: &mut PackageContext<'_>) -> Result<()> {
        let mut opts: OrangefsOptions = ctx.config.to_typed()?;
        if opts.ofs_mode != OfsMode::Kern {
            opts.sudoenv = false;
            ctx.config.insert("sudoenv", false);
        }

        let layout = Layout::new(&opts, &ctx.paths.private_dir, ctx.hostfile().hosts());
        ctx.config.merge(&layout)?;
        ctx.groups = layout.groups();
        let all = ctx.hostfile().group("all");
        let servers = HostGroup::new(SERVER, layout.server_host_set.clone());
        check_storage(ctx.resource_graph(), &servers, &opts.ofs_data_dir)?;

        // Host lists
        for (hosts, path) in [
            (&layout.client_host_set, &layout.client_hosts_path),
            (&layout.server_host_set, &layout.server_hosts_path),
            (&layout.md_host_set, &layout.metadata_hosts_path),
        ] {
            corral_core::Hostfile::from_hosts(hosts.clone()).save(path)?;
        }
        ctx.copy(
            &[
                layout.client_hosts_path.clone(),
                layout.server_hosts_path.clone(),
                layout.metadata_hosts_path.clone(),
            ],
            &all,
        )
        .await?;
        info!("Distributed client, server, and metadata hostfiles");

        // Filesystem config
        let genconfig = match ctx.env.get(ORANGEFS_PATH) {
            Some(prefix) => format!("{}/bin/pvfs2-genconfig", prefix.trim_end_matches('/')),
            None => "pvfs2-genconfig".to_string(),
        };
        ctx.run(
            genconfig_command(&opts, &layout, &genconfig),
            &HostGroup::local("local"),
        )
        .await?;
        ctx.copy(std::slice::from_ref(&layout.pfs_conf), &all).await?;
        info!("Generated pvfs2 config: {}", layout.pfs_conf.display());

        // Directories
        ctx.run_ordered(&[
            DispatchStep::mkdir(&ctx.groups[0], vec![PathBuf::from(&opts.mount)], &ctx.env),
            DispatchStep::mkdir(&ctx.groups[1], vec![layout.storage.clone()], &ctx.env),
            DispatchStep::mkdir(&ctx.groups[2], vec![layout.metadata.clone()], &ctx.env),
        ])
        .await?;
        info!("Created mount, metadata and storage directories (mount at {})", opts.mount);

        // Client tab
        let md_host = layout
            .md_host_set
            .first()
            .ok_or_else(|| Error::invalid_config("orangefs has no metadata hosts"))?;
        if let Some(parent) = layout.pvfs2tab.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&layout.pvfs2tab, pvfs2tab_line(&opts, md_host))?;
        ctx.copy(std::slice::from_ref(&layout.pvfs2tab), &all).await?;
        ctx.env.insert(
            "PVFS2TAB_FILE".to_string(),
            layout.pvfs2tab.display().to_string(),
        );
        info!("Created PVFS2TAB_FILE: {}", layout.pvfs2tab.display());

        // Format server storage
        let format = CommandTemplate::new(format!(
            "{} -f -a {{{{ host }}}} {{{{ pfs_conf }}}}",
            match ctx.env.get(ORANGEFS_PATH) {
                Some(prefix) => format!("{}/sbin/pvfs2-server", prefix.trim_end_matches('/')),
                None => "pvfs2-server".to_string(),
            }
        ))
        .with_var("pfs_conf", &layout.pfs_conf)?;
        ctx.run(format, &servers).await?;
        Ok(())
    }

    async fn start(&self, ctx: &PackageContext<'_>) -> Result<()> {
        let deployment = Deployment::from_context(ctx)?;
        let strategy = deployment.opts.ofs_mode.strategy();
        debug!("Starting {} in {} mode", ctx.pkg_id, strategy.name());
        ctx.run_ordered(&strategy.start_steps(&deployment)?).await?;
        Ok(())
    }

    async fn stop(&self, ctx: &PackageContext<'_>) -> Result<()> {
        let deployment = Deployment::from_context(ctx)?;
        let strategy = deployment.opts.ofs_mode.strategy();
        debug!("Stopping {} in {} mode", ctx.pkg_id, strategy.name());
        ctx.run_ordered(&strategy.stop_steps(&deployment)?).await?;
        Ok(())
    }

    async fn clean(&self, ctx: &PackageContext<'_>) -> Result<()> {
        let d = Deployment::from_context(ctx)?;
        ctx.run_ordered(&[
            DispatchStep::remove(
                d.clients,
                vec![PathBuf::from(&d.opts.mount), d.layout.client_log.clone()],
                d.env,
            ),
            DispatchStep::remove(
                d.servers,
                vec![d.layout.storage.clone(), d.layout.log.clone()],
                d.env,
            ),
            DispatchStep::remove(d.metadata, vec![d.layout.metadata.clone()], d.env),
        ])
        .await?;
        Ok(())
    }

    async fn status(&self, ctx: &PackageContext<'_>) -> Result<bool> {
        let d = Deployment::from_context(ctx)?;
        let mounted = ctx
            .dispatcher()
            .run("mount | grep pvfs", d.servers, d.env)
            .await?;
        if !mounted.is_success() {
            return Ok(false);
        }
        let ping = format!(
            "{} -m {} | grep \"appears to be correctly configured\"",
            d.tool("bin", "pvfs2-ping"),
            d.opts.mount
        );
        let pinged = ctx.dispatcher().run(ping, d.clients, d.env).await?;
        Ok(pinged.is_success())
    }
}
