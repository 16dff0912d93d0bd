//! The contract every package implements
//!
//! A [`Package`] is stateless: the resolved configuration, environment and
//! host groups live in the owning [`PackageInstance`](crate::PackageInstance)
//! and are lent to the package through a [`PackageContext`] for the
//! duration of one lifecycle call.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use corral_core::{CorralConfig, Env, Error, HostGroup, Hostfile, ResourceGraph, Result};
use corral_dispatch::{CommandTemplate, DispatchReport, DispatchStep, HostGroupDispatcher};

use crate::schema::{ConfigurationSchema, ResolvedConfig};

/// A deployable component
#[async_trait]
pub trait Package: Send + Sync {
    /// CamelCase class name matching the package-type directory
    fn class_name(&self) -> &str;

    /// The option menu for this package type
    fn configure_menu(&self) -> ConfigurationSchema;

    /// Re-derive the host groups from a persisted configuration
    ///
    /// Groups are returned in role-declaration order, which is the order
    /// multi-group operations dispatch in.
    fn host_groups(&self, config: &ResolvedConfig) -> Result<Vec<HostGroup>>;

    /// Derive paths and host groups and run setup commands
    ///
    /// The context holds the freshly resolved configuration; the package
    /// may add derived keys to it and export variables into its env.
    async fn configure(&self, ctx: &mut PackageContext<'_>) -> Result<()>;

    async fn start(&self, ctx: &PackageContext<'_>) -> Result<()>;

    async fn stop(&self, ctx: &PackageContext<'_>) -> Result<()>;

    /// Remove data created by configure and start; must tolerate missing paths
    async fn clean(&self, ctx: &PackageContext<'_>) -> Result<()>;

    /// Side-effect-free health check
    async fn status(&self, ctx: &PackageContext<'_>) -> Result<bool>;
}

/// Shared services a lifecycle call reaches through
#[derive(Clone, Copy)]
pub struct Runtime<'a> {
    pub dispatcher: &'a HostGroupDispatcher,
    pub hostfile: &'a Hostfile,
    pub resource_graph: &'a ResourceGraph,
}

impl<'a> Runtime<'a> {
    pub fn new(
        dispatcher: &'a HostGroupDispatcher,
        hostfile: &'a Hostfile,
        resource_graph: &'a ResourceGraph,
    ) -> Self {
        Self {
            dispatcher,
            hostfile,
            resource_graph,
        }
    }
}

/// Directories owned by one package of one pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackagePaths {
    /// Local metadata directory under the pipeline
    pub config_dir: PathBuf,
    /// Same path on every host, private to this package
    pub private_dir: PathBuf,
    /// Path with a shared view across hosts, if one is configured
    pub shared_dir: Option<PathBuf>,
}

impl PackagePaths {
    /// `<dir>/<pipeline_id>/<pkg_id>` under each configured directory
    pub fn for_package(config: &CorralConfig, pipeline_id: &str, pkg_id: &str) -> Result<Self> {
        let under = |base: PathBuf| base.join(pipeline_id).join(pkg_id);
        Ok(Self {
            config_dir: under(config.config_dir()?),
            private_dir: under(config.private_dir()?),
            shared_dir: config.shared_dir()?.map(under),
        })
    }

    /// Variables visible to derived defaults and command templates
    pub fn vars(&self, pkg_id: &str) -> Env {
        let mut vars = Env::new();
        vars.insert("pkg_id".to_string(), pkg_id.to_string());
        vars.insert("config_dir".to_string(), display(&self.config_dir));
        vars.insert("private_dir".to_string(), display(&self.private_dir));
        if let Some(shared) = &self.shared_dir {
            vars.insert("shared_dir".to_string(), display(shared));
        }
        vars
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Everything a package sees during one lifecycle call
pub struct PackageContext<'a> {
    pub pkg_id: &'a str,
    pub runtime: Runtime<'a>,
    pub paths: &'a PackagePaths,
    pub config: ResolvedConfig,
    pub env: Env,
    /// Host groups re-derived from `config`; empty during configure
    pub groups: Vec<HostGroup>,
}

impl<'a> PackageContext<'a> {
    pub fn dispatcher(&self) -> &HostGroupDispatcher {
        self.runtime.dispatcher
    }

    pub fn hostfile(&self) -> &Hostfile {
        self.runtime.hostfile
    }

    pub fn resource_graph(&self) -> &ResourceGraph {
        self.runtime.resource_graph
    }

    pub fn group(&self, role: &str) -> Result<&HostGroup> {
        self.groups
            .iter()
            .find(|g| g.role == role)
            .ok_or_else(|| {
                Error::invalid_config(format!("package '{}' has no '{}' hosts", self.pkg_id, role))
            })
    }

    /// Run a command on a group; any failed host fails the call
    pub async fn run(
        &self,
        command: impl Into<CommandTemplate>,
        group: &HostGroup,
    ) -> Result<DispatchReport> {
        self.dispatcher()
            .run(command, group, &self.env)
            .await?
            .into_result()
    }

    /// Copy local paths to the same location on a group
    pub async fn copy(&self, paths: &[PathBuf], group: &HostGroup) -> Result<DispatchReport> {
        self.dispatcher().copy(paths, group).await.into_result()
    }

    pub async fn mkdir(&self, paths: &[PathBuf], group: &HostGroup) -> Result<DispatchReport> {
        self.dispatcher()
            .mkdir(paths, group, &self.env)
            .await
            .into_result()
    }

    pub async fn remove(&self, paths: &[PathBuf], group: &HostGroup) -> Result<DispatchReport> {
        self.dispatcher()
            .remove(paths, group, &self.env)
            .await
            .into_result()
    }

    /// Execute steps in order, stopping at the first failing group
    pub async fn run_ordered(&self, steps: &[DispatchStep]) -> Result<Vec<DispatchReport>> {
        self.dispatcher().run_ordered(steps).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_paths_nest_pipeline_and_id() {
        let config = CorralConfig::new("/c", "/p", Some("/s".to_string()));
        let paths = PackagePaths::for_package(&config, "ppl", "ofs").unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/c/ppl/ofs"));
        assert_eq!(paths.private_dir, PathBuf::from("/p/ppl/ofs"));
        assert_eq!(paths.shared_dir, Some(PathBuf::from("/s/ppl/ofs")));

        let vars = paths.vars("ofs");
        assert_eq!(vars.get("private_dir").map(String::as_str), Some("/p/ppl/ofs"));
        assert_eq!(vars.get("pkg_id").map(String::as_str), Some("ofs"));
    }

    #[test]
    fn test_package_is_object_safe() {
        fn _assert_object_safe(_: &dyn Package) {}
    }
}
