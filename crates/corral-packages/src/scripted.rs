//! Manifest-driven packages
//!
//! Roles are carved out of the hostfile on configure and the host lists
//! are kept in the config as `<role>_host_set`, so later calls can rebuild
//! the groups from persisted state alone.

use std::path::PathBuf;

use async_trait::async_trait;
use corral_core::{Error, HostGroup, Result};
use corral_dispatch::{CommandTemplate, DispatchStep};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::manifest::{CommandStep, PackageManifest};
use crate::package::{Package, PackageContext};
use crate::schema::{ConfigurationSchema, ResolvedConfig};

/// Config key holding the hosts of a role
pub fn host_set_key(role: &str) -> String {
    format!("{}_host_set", role)
}

/// A package whose behavior is declared in its package.yaml
pub struct ScriptedPackage {
    manifest: PackageManifest,
}

impl ScriptedPackage {
    pub fn new(manifest: PackageManifest) -> Self {
        Self { manifest }
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Template variables: resolved config plus package paths
    fn template_vars(ctx: &PackageContext<'_>) -> Map<String, Value> {
        let mut vars = ctx.config.to_object();
        for (key, value) in ctx.paths.vars(ctx.pkg_id) {
            vars.entry(key).or_insert(Value::String(value));
        }
        vars
    }

    fn steps(
        ctx: &PackageContext<'_>,
        commands: &[CommandStep],
        groups: &[HostGroup],
    ) -> Result<Vec<DispatchStep>> {
        let vars = Self::template_vars(ctx);
        let render_paths = |paths: &[String]| -> Result<Vec<PathBuf>> {
            paths
                .iter()
                .map(|p| {
                    CommandTemplate::new(p.as_str())
                        .with_vars(vars.clone())
                        .render()
                        .map(PathBuf::from)
                })
                .collect()
        };

        commands
            .iter()
            .map(|step| {
                let group = groups
                    .iter()
                    .find(|g| g.role == step.role)
                    .ok_or_else(|| Error::not_configured(ctx.pkg_id))?;
                let dispatch = if let Some(run) = &step.run {
                    let template = CommandTemplate::new(run.as_str()).with_vars(vars.clone());
                    DispatchStep::run(group, template, &ctx.env)
                } else if !step.copy.is_empty() {
                    DispatchStep::copy(group, render_paths(&step.copy)?)
                } else if !step.mkdir.is_empty() {
                    DispatchStep::mkdir(group, render_paths(&step.mkdir)?, &ctx.env)
                } else {
                    DispatchStep::remove(group, render_paths(&step.remove)?, &ctx.env)
                };
                Ok(dispatch)
            })
            .collect()
    }

    async fn run_phase(&self, ctx: &PackageContext<'_>, commands: &[CommandStep]) -> Result<()> {
        let steps = Self::steps(ctx, commands, &ctx.groups)?;
        ctx.run_ordered(&steps).await?;
        Ok(())
    }
}

#[async_trait]
impl Package for ScriptedPackage {
    fn class_name(&self) -> &str {
        &self.manifest.class
    }

    fn configure_menu(&self) -> ConfigurationSchema {
        self.manifest.menu.clone()
    }

    fn host_groups(&self, config: &ResolvedConfig) -> Result<Vec<HostGroup>> {
        self.manifest
            .roles
            .iter()
            .map(|role| {
                let hosts = match config.get(&host_set_key(&role.name)) {
                    Some(value) => serde_json::from_value::<Vec<String>>(value.clone())?,
                    None => Vec::new(),
                };
                Ok(HostGroup::new(role.name.clone(), hosts))
            })
            .collect()
    }

    async fn configure(&self, ctx: &mut PackageContext<'_>) -> Result<()> {
        for role in &self.manifest.roles {
            let hosts = match role.count {
                Some(count) => ctx.hostfile().subset(count),
                None => ctx.hostfile().clone(),
            };
            debug!("{}: role {} -> {}", ctx.pkg_id, role.name, hosts.host_str(","));
            ctx.config.set(host_set_key(&role.name), &hosts.hosts())?;
        }
        ctx.groups = self.host_groups(&ctx.config)?;

        let vars = Self::template_vars(ctx);
        for (key, value) in &self.manifest.env {
            let rendered = CommandTemplate::new(value.as_str())
                .with_vars(vars.clone())
                .render()?;
            ctx.env.insert(key.clone(), rendered);
        }

        self.run_phase(ctx, &self.manifest.commands.configure).await?;
        info!("Configured {} ({})", ctx.pkg_id, self.manifest.class);
        Ok(())
    }

    async fn start(&self, ctx: &PackageContext<'_>) -> Result<()> {
        self.run_phase(ctx, &self.manifest.commands.start).await
    }

    async fn stop(&self, ctx: &PackageContext<'_>) -> Result<()> {
        self.run_phase(ctx, &self.manifest.commands.stop).await
    }

    async fn clean(&self, ctx: &PackageContext<'_>) -> Result<()> {
        self.run_phase(ctx, &self.manifest.commands.clean).await
    }

    async fn status(&self, ctx: &PackageContext<'_>) -> Result<bool> {
        let steps = Self::steps(ctx, &self.manifest.commands.status, &ctx.groups)?;
        for step in &steps {
            let report = ctx.dispatcher().execute(step).await?;
            if !report.is_success() {
                debug!("{}: status failed on {}", ctx.pkg_id, report.group);
                return Ok(false);
            }
        }
        Ok(true)
    }
}
