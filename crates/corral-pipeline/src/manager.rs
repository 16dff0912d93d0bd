//! The manager context every corral command runs against

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use corral_core::config::{load_yaml, save_yaml, ENV_DIR_NAME};
use corral_core::{
    ConfigStore, CorralConfig, Env, Error, Hostfile, Repository, ResourceGraph, Result,
};
use corral_dispatch::{HostGroupDispatcher, HostTransport, ResourceGraphBuilder};
use corral_packages::{
    AddOutcome, ConfigMap, Discovered, LifecycleState, PackageInstance, PackagePaths,
    PackageRegistry, RepoListing, Runtime,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pipeline::Pipeline;

/// File under `config_dir` listing packages a destroy could not clean
pub const ORPHANS_FILE: &str = "orphaned.yaml";

/// Bootstrap target that lays out config, private and shared dirs under the corral home
pub const LOCAL_MACHINE: &str = "local";

/// A package left behind by `destroy` because its clean failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanRecord {
    pub pipeline: String,
    pub id: String,
    #[serde(rename = "type")]
    pub package_type: String,
    pub private_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_dir: Option<PathBuf>,
    pub error: String,
    pub orphaned_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OrphansFile {
    #[serde(default)]
    orphans: Vec<OrphanRecord>,
}

/// Outcome of destroying a pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestroyReport {
    pub pipeline: String,
    pub cleaned: Vec<String>,
    pub orphaned: Vec<OrphanRecord>,
}

/// Health of one package in the current pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub id: String,
    pub package_type: String,
    pub state: LifecycleState,
    /// `None` when the package was never configured or its type is missing
    pub healthy: Option<bool>,
    /// False when no repository provides the package type any more
    pub resolved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Start,
    Stop,
    Clean,
}

impl Sweep {
    fn reversed(self) -> bool {
        matches!(self, Sweep::Stop | Sweep::Clean)
    }

    /// States in which a package is passed over rather than acted on
    fn skips(self, state: LifecycleState) -> bool {
        match self {
            Sweep::Start => matches!(state, LifecycleState::Unconfigured | LifecycleState::Running),
            Sweep::Stop => state != LifecycleState::Running,
            Sweep::Clean => state == LifecycleState::Unconfigured,
        }
    }
}

/// Owns everything a command needs and persists it between invocations
pub struct PipelineManager {
    store: ConfigStore,
    config: CorralConfig,
    registry: PackageRegistry,
    resource_graph: ResourceGraph,
    hostfile: Hostfile,
    dispatcher: HostGroupDispatcher,
    current: Option<Pipeline>,
}

impl PipelineManager {
    /// Initialize a fresh store and return a manager for it
    ///
    /// Any existing repository list and resource graph are kept.
    pub fn create(
        store: ConfigStore,
        config: CorralConfig,
        transport: Arc<dyn HostTransport>,
    ) -> Result<Self> {
        store.initialize(&config)?;
        std::fs::create_dir_all(store.builtin_dir().join(corral_core::config::BUILTIN_REPO))?;
        Self::load(store, transport)
    }

    /// Seed the store from a machine preset and open a manager on it
    ///
    /// `local` places every directory under the corral home. Any other
    /// name copies `<builtin>/config/<machine>.yaml` to corral.yaml and
    /// `<builtin>/resource_graph/<machine>.yaml` to resource_graph.yaml.
    pub fn bootstrap_from(
        store: ConfigStore,
        machine: &str,
        transport: Arc<dyn HostTransport>,
    ) -> Result<Self> {
        if machine == LOCAL_MACHINE {
            let under = |name: &str| store.home().join(name).display().to_string();
            let config =
                CorralConfig::new(under("config"), under("private"), Some(under("shared")));
            let mut manager = Self::create(store, config, transport)?;
            manager.save()?;
            info!("Bootstrapped corral for the local machine");
            return Ok(manager);
        }

        let config_path = store.machine_config_path(machine);
        let rg_path = store.machine_resource_graph_path(machine);
        if !config_path.exists() && !rg_path.exists() {
            return Err(Error::missing_resource(format!(
                "No preset for machine '{}' under {}",
                machine,
                store.machines_dir().display()
            )));
        }

        std::fs::create_dir_all(store.home())?;
        if config_path.exists() {
            let mut config: CorralConfig = load_yaml(&config_path)?;
            config.hostfile = match config.hostfile.take() {
                Some(path) => Some(corral_core::expand_path(&path.to_string_lossy())?),
                None => None,
            };
            config.current_pipeline = None;
            store.save_config(&config)?;
        }
        if rg_path.exists() {
            ResourceGraph::load(&rg_path)?.save(store.resource_graph_path())?;
        }
        std::fs::create_dir_all(store.builtin_dir().join(corral_core::config::BUILTIN_REPO))?;

        let mut manager = Self::load(store, transport)?;
        manager.save()?;
        info!("Bootstrapped corral from machine preset {}", machine);
        Ok(manager)
    }

    /// Machines `bootstrap_from` has presets for
    pub fn bootstrap_list(store: &ConfigStore) -> Result<Vec<String>> {
        store.list_machines()
    }

    /// Restore the manager from the store
    pub fn load(store: ConfigStore, transport: Arc<dyn HostTransport>) -> Result<Self> {
        let config = store.load_config()?;
        let registry = PackageRegistry::with_builtins(store.load_repos()?);

        let rg_path = store.resource_graph_path();
        let resource_graph = if rg_path.exists() {
            ResourceGraph::load(&rg_path)?
        } else {
            ResourceGraph::new()
        };

        let hostfile = match &config.hostfile {
            Some(path) => Hostfile::load(path).unwrap_or_else(|e| {
                warn!(
                    "Failed to open hostfile {}: {}. Falling back to localhost",
                    path.display(),
                    e
                );
                Hostfile::localhost()
            }),
            None => Hostfile::localhost(),
        };

        let dispatcher = HostGroupDispatcher::new(transport)
            .with_timeout(Duration::from_secs(config.command_timeout_secs));

        let config_dir = config.config_dir()?;
        std::fs::create_dir_all(config_dir.join(ENV_DIR_NAME))?;
        if let Some(shared) = config.shared_dir()? {
            std::fs::create_dir_all(shared)?;
        }

        let mut manager = Self {
            store,
            config,
            registry,
            resource_graph,
            hostfile,
            dispatcher,
            current: None,
        };
        if let Some(id) = manager.config.current_pipeline.clone() {
            match Pipeline::load(&id, &manager.config, &manager.registry) {
                Ok(pipeline) => manager.current = Some(pipeline),
                Err(Error::PipelineNotFound { .. }) => {
                    warn!("Current pipeline {} no longer exists", id);
                    manager.config.current_pipeline = None;
                }
                Err(e) => return Err(e),
            }
        }
        debug!(
            "Loaded manager: {} repos, {} hosts, pipeline {:?}",
            manager.registry.repos().len(),
            manager.hostfile.len(),
            manager.config.current_pipeline
        );
        Ok(manager)
    }

    /// Persist in reverse load order
    pub fn save(&mut self) -> Result<()> {
        if let Some(pipeline) = &self.current {
            pipeline.save()?;
        }
        self.resource_graph
            .save(self.store.resource_graph_path())?;
        self.store.save_repos(self.registry.repos())?;
        self.config.current_pipeline = self.current.as_ref().map(|p| p.id().to_string());
        self.config.hostfile = self.hostfile.path().map(Path::to_path_buf);
        self.store.save_config(&self.config)?;
        debug!("Saved manager state to {:?}", self.store.home());
        Ok(())
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn config(&self) -> &CorralConfig {
        &self.config
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub fn hostfile(&self) -> &Hostfile {
        &self.hostfile
    }

    pub fn resource_graph(&self) -> &ResourceGraph {
        &self.resource_graph
    }

    pub fn dispatcher(&self) -> &HostGroupDispatcher {
        &self.dispatcher
    }

    pub fn runtime(&self) -> Runtime<'_> {
        Runtime::new(&self.dispatcher, &self.hostfile, &self.resource_graph)
    }

    /// corral.yaml as it would be written
    pub fn print_config(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(&self.config)?)
    }

    /// Point at a new hostfile; an empty path selects localhost
    pub fn set_hostfile(&mut self, path: &str) -> Result<()> {
        if path.is_empty() {
            self.hostfile = Hostfile::localhost();
            info!("Hostfile reset to localhost");
            return Ok(());
        }
        let path = std::path::absolute(corral_core::expand_path(path)?)?;
        self.hostfile = Hostfile::load(&path)?;
        info!("Hostfile set to {} ({} hosts)", path.display(), self.hostfile.len());
        Ok(())
    }

    /// Delete the shared directory here and the private directory on every host
    pub async fn reset(&mut self) -> Result<()> {
        if let Some(shared) = self.config.shared_dir()? {
            if shared.exists() {
                std::fs::remove_dir_all(&shared)?;
            }
            info!("Removed shared directory {}", shared.display());
        }
        let private = self.config.private_dir()?;
        self.dispatcher
            .remove(&[private.clone()], &self.hostfile.group("all"), &Env::new())
            .await
            .into_result()?;
        info!("Removed private directory {} on {} hosts", private.display(), self.hostfile.len());
        Ok(())
    }

    // Repositories

    pub fn add_repo(&mut self, path: impl AsRef<Path>, force: bool) -> Result<AddOutcome> {
        self.registry.add(path, force)
    }

    pub fn promote_repo(&mut self, name: &str) -> Result<()> {
        self.registry.promote(name)
    }

    pub fn remove_repo(&mut self, name: &str) -> Result<Repository> {
        self.registry.remove(name)
    }

    pub fn list_repos(&self) -> Result<Vec<RepoListing>> {
        self.registry
            .repos()
            .iter()
            .map(|r| self.registry.list_repo(&r.name))
            .collect()
    }

    pub fn list_repo(&self, name: &str) -> Result<RepoListing> {
        self.registry.list_repo(name)
    }

    pub fn available_packages(&self) -> Result<Vec<Discovered>> {
        self.registry.available()
    }

    // Resource graph

    /// Introspect every host and replace the resource graph
    pub async fn build_resource_graph(&mut self) -> Result<&ResourceGraph> {
        let group = self.hostfile.group("all");
        self.resource_graph = ResourceGraphBuilder::new(&self.dispatcher)
            .build(&group)
            .await?;
        Ok(&self.resource_graph)
    }

    /// Re-probe every host, keeping facts about hosts not in the hostfile
    pub async fn modify_resource_graph(&mut self) -> Result<&ResourceGraph> {
        let group = self.hostfile.group("all");
        ResourceGraphBuilder::new(&self.dispatcher)
            .modify(&mut self.resource_graph, &group)
            .await?;
        Ok(&self.resource_graph)
    }

    // Pipelines

    pub fn current(&self) -> Option<&Pipeline> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Result<&mut Pipeline> {
        self.current.as_mut().ok_or(Error::NoCurrentPipeline)
    }

    /// Create a pipeline (or reopen an existing one) and focus on it
    pub async fn create_pipeline(&mut self, id: &str) -> Result<&Pipeline> {
        let dir = self.config.pipeline_dir(id)?;
        let pipeline = if Pipeline::exists(&dir) {
            warn!("Pipeline {} already exists; switching to it", id);
            Pipeline::load(id, &self.config, &self.registry)?
        } else {
            std::fs::create_dir_all(&dir)?;
            let pipeline = Pipeline::new(id, dir);
            pipeline.save()?;
            info!("Created pipeline {}", id);
            pipeline
        };

        let private = self.config.private_dir()?.join(id);
        self.dispatcher
            .mkdir(&[private], &self.hostfile.group("all"), &Env::new())
            .await
            .into_result()?;

        self.focus(pipeline);
        self.current_mut().map(|p| &*p)
    }

    /// Focus on an existing pipeline
    pub fn cd(&mut self, id: &str) -> Result<&Pipeline> {
        let pipeline = Pipeline::load(id, &self.config, &self.registry)?;
        self.focus(pipeline);
        self.current_mut().map(|p| &*p)
    }

    /// Pipeline ids under `config_dir`, sorted
    pub fn list_pipelines(&self) -> Result<Vec<String>> {
        let config_dir = self.config.config_dir()?;
        if !config_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&config_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && name != ENV_DIR_NAME {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Construct a package, configure it and add it to the current pipeline
    ///
    /// The package is only added when configure succeeds.
    pub async fn append(
        &mut self,
        package_type: &str,
        pkg_id: Option<&str>,
        params: &ConfigMap,
    ) -> Result<&PackageInstance> {
        let runtime = Runtime::new(&self.dispatcher, &self.hostfile, &self.resource_graph);
        let pipeline = self.current.as_mut().ok_or(Error::NoCurrentPipeline)?;
        let pkg_id = pkg_id.unwrap_or(package_type);
        if pipeline.contains(pkg_id) {
            return Err(Error::DuplicatePackageId {
                pipeline: pipeline.id().to_string(),
                id: pkg_id.to_string(),
            });
        }

        let paths = PackagePaths::for_package(&self.config, pipeline.id(), pkg_id)?;
        let mut instance = self
            .registry
            .construct(package_type)?
            .with_id(pkg_id)
            .with_paths(paths.clone());

        // Configure may write generated files here; drop it again on failure
        let created = !paths.config_dir.exists();
        std::fs::create_dir_all(&paths.config_dir)?;
        if let Err(e) = instance.configure(runtime, params).await {
            if created {
                if let Err(rm) = std::fs::remove_dir_all(&paths.config_dir) {
                    warn!("Failed to remove {}: {}", paths.config_dir.display(), rm);
                }
            }
            return Err(e);
        }

        let appended = pipeline.append(instance)?;
        Ok(&*appended)
    }

    /// Drop a package from the current pipeline without cleaning it
    pub fn remove_package(&mut self, pkg_id: &str) -> Result<PackageInstance> {
        let removed = self.current_mut()?.remove(pkg_id)?;
        info!("Removed {} from the pipeline", pkg_id);
        Ok(removed)
    }

    /// Reconfigure one package of the current pipeline
    pub async fn configure_package(&mut self, pkg_id: &str, params: &ConfigMap) -> Result<()> {
        let runtime = Runtime::new(&self.dispatcher, &self.hostfile, &self.resource_graph);
        let pipeline = self.current.as_mut().ok_or(Error::NoCurrentPipeline)?;
        pipeline.get_mut(pkg_id)?.configure(runtime, params).await?;
        pipeline.save()
    }

    /// Start packages in pipeline order
    pub async fn start(&mut self) -> Result<Vec<String>> {
        self.sweep(Sweep::Start).await
    }

    /// Stop packages in reverse pipeline order
    pub async fn stop(&mut self) -> Result<Vec<String>> {
        self.sweep(Sweep::Stop).await
    }

    /// Clean packages in reverse pipeline order
    pub async fn clean(&mut self) -> Result<Vec<String>> {
        self.sweep(Sweep::Clean).await
    }

    /// Query every package in pipeline order
    pub async fn status(&mut self) -> Result<Vec<StatusEntry>> {
        let runtime = Runtime::new(&self.dispatcher, &self.hostfile, &self.resource_graph);
        let pipeline = self.current.as_mut().ok_or(Error::NoCurrentPipeline)?;
        let mut entries = Vec::with_capacity(pipeline.len());
        for pkg in pipeline.packages.iter_mut() {
            let healthy = if !pkg.is_resolved() {
                warn!("{}: package type {} is not available", pkg.id(), pkg.package_type());
                None
            } else if pkg.state().is_configured() {
                Some(pkg.status(runtime).await?)
            } else {
                None
            };
            entries.push(StatusEntry {
                id: pkg.id().to_string(),
                package_type: pkg.package_type().to_string(),
                state: pkg.state(),
                healthy,
                resolved: pkg.is_resolved(),
            });
        }
        Ok(entries)
    }

    /// Clean every package of a pipeline and delete its directory
    ///
    /// Packages whose clean fails are recorded in `orphaned.yaml`; their
    /// remote data is left in place.
    pub async fn destroy(&mut self, id: Option<&str>) -> Result<DestroyReport> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self
                .current
                .as_ref()
                .map(|p| p.id().to_string())
                .ok_or(Error::NoCurrentPipeline)?,
        };
        let mut pipeline = match self.current.take() {
            Some(current) if current.id() == id => current,
            other => {
                self.current = other;
                Pipeline::load(&id, &self.config, &self.registry)?
            }
        };

        let runtime = Runtime::new(&self.dispatcher, &self.hostfile, &self.resource_graph);
        let mut report = DestroyReport {
            pipeline: id.clone(),
            ..Default::default()
        };
        for pkg in pipeline.packages.iter_mut().rev() {
            if !pkg.state().is_configured() {
                continue;
            }
            match pkg.clean(runtime).await {
                Ok(()) => report.cleaned.push(pkg.id().to_string()),
                Err(e) => {
                    warn!("Failed to clean {}: {}. Recording it as orphaned", pkg.id(), e);
                    report.orphaned.push(OrphanRecord {
                        pipeline: id.clone(),
                        id: pkg.id().to_string(),
                        package_type: pkg.package_type().to_string(),
                        private_dir: pkg.paths().private_dir.clone(),
                        shared_dir: pkg.paths().shared_dir.clone(),
                        error: e.to_string(),
                        orphaned_at: Utc::now(),
                    });
                }
            }
        }

        if !report.orphaned.is_empty() {
            self.record_orphans(&report.orphaned)?;
        }
        if pipeline.dir().exists() {
            std::fs::remove_dir_all(pipeline.dir())?;
        }
        if self.config.current_pipeline.as_deref() == Some(id.as_str()) {
            self.config.current_pipeline = None;
        }
        info!(
            "Destroyed pipeline {} ({} cleaned, {} orphaned)",
            id,
            report.cleaned.len(),
            report.orphaned.len()
        );
        Ok(report)
    }

    /// Packages previously orphaned by `destroy`
    pub fn orphans(&self) -> Result<Vec<OrphanRecord>> {
        let path = self.orphans_path()?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file: OrphansFile = load_yaml(&path)?;
        Ok(file.orphans)
    }

    fn record_orphans(&self, orphans: &[OrphanRecord]) -> Result<()> {
        let mut all = self.orphans()?;
        all.extend_from_slice(orphans);
        save_yaml(&self.orphans_path()?, &OrphansFile { orphans: all })
    }

    fn orphans_path(&self) -> Result<PathBuf> {
        Ok(self.config.config_dir()?.join(ORPHANS_FILE))
    }

    fn focus(&mut self, pipeline: Pipeline) {
        self.config.current_pipeline = Some(pipeline.id().to_string());
        self.current = Some(pipeline);
    }

    /// Apply one lifecycle action across the current pipeline
    ///
    /// The first failure stops the sweep; progress so far is saved either way.
    async fn sweep(&mut self, sweep: Sweep) -> Result<Vec<String>> {
        let runtime = Runtime::new(&self.dispatcher, &self.hostfile, &self.resource_graph);
        let pipeline = self.current.as_mut().ok_or(Error::NoCurrentPipeline)?;

        let mut order: Vec<usize> = (0..pipeline.len()).collect();
        if sweep.reversed() {
            order.reverse();
        }

        let mut done = Vec::new();
        let mut outcome = Ok(());
        for index in order {
            let pkg = &mut pipeline.packages[index];
            if sweep.skips(pkg.state()) {
                debug!("{:?}: skipping {} ({})", sweep, pkg.id(), pkg.state());
                continue;
            }
            let result = match sweep {
                Sweep::Start => pkg.start(runtime).await,
                Sweep::Stop => pkg.stop(runtime).await,
                Sweep::Clean => pkg.clean(runtime).await,
            };
            if let Err(e) = result {
                warn!("{:?} failed at {}; later packages were not touched", sweep, pkg.id());
                outcome = Err(e);
                break;
            }
            done.push(pkg.id().to_string());
        }

        pipeline.save()?;
        outcome.map(|()| done)
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("home", &self.store.home())
            .field("repos", &self.registry.repos().len())
            .field("hosts", &self.hostfile.len())
            .field("current", &self.current.as_ref().map(Pipeline::id))
            .finish_non_exhaustive()
    }
}
