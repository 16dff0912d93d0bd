//! Configured units of deployment

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corral_core::{Env, Error, HostGroup, Result};
use tracing::{debug, info, warn};

use crate::lifecycle::{LifecycleAction, LifecycleState, PackageRecord};
use crate::package::{Package, PackageContext, PackagePaths, Runtime};
use crate::schema::{ConfigMap, ConfigurationSchema, ResolvedConfig};

/// One package of a pipeline
///
/// Owns the resolved configuration, environment and lifecycle state.
/// Config and env change only through [`configure`](Self::configure); a
/// failed transition leaves every field as it was.
pub struct PackageInstance {
    pkg_id: String,
    package_type: String,
    repo: String,
    package: Box<dyn Package>,
    schema: ConfigurationSchema,
    paths: PackagePaths,
    state: LifecycleState,
    config: ResolvedConfig,
    env: Env,
    host_groups: Vec<HostGroup>,
    last_transition: Option<DateTime<Utc>>,
    unresolved: Option<String>,
}

impl PackageInstance {
    /// A fresh, unconfigured instance
    pub fn new(
        package_type: impl Into<String>,
        repo: impl Into<String>,
        package: Box<dyn Package>,
    ) -> Self {
        let package_type = package_type.into();
        let schema = package.configure_menu();
        Self {
            pkg_id: package_type.clone(),
            package_type,
            repo: repo.into(),
            package,
            schema,
            paths: PackagePaths::default(),
            state: LifecycleState::Unconfigured,
            config: ResolvedConfig::default(),
            env: Env::new(),
            host_groups: Vec::new(),
            last_transition: None,
            unresolved: None,
        }
    }

    /// A persisted package whose type no longer resolves in any repository
    ///
    /// The record is kept as-is so the pipeline can still be listed, saved
    /// and destroyed; every lifecycle call on it fails with `PackageNotFound`.
    pub fn unresolved(record: PackageRecord, reason: impl Into<String>) -> Self {
        let package = Box::new(Unresolved {
            package_type: record.package_type.clone(),
        });
        let mut instance =
            Self::new(record.package_type.clone(), record.repo.clone(), package).restore(record);
        instance.unresolved = Some(reason.into());
        instance
    }

    /// Set the id the package is known by within its pipeline
    pub fn with_id(mut self, pkg_id: impl Into<String>) -> Self {
        self.pkg_id = pkg_id.into();
        self
    }

    pub fn with_paths(mut self, paths: PackagePaths) -> Self {
        self.paths = paths;
        self
    }

    /// Restore persisted state onto a freshly constructed instance
    ///
    /// Host groups are re-derived from the restored config; a config the
    /// package cannot read leaves them empty until the next lifecycle call.
    pub fn restore(mut self, record: PackageRecord) -> Self {
        self.pkg_id = record.id;
        self.state = record.state;
        self.config = record.config;
        self.env = record.env;
        self.last_transition = record.last_transition;
        if self.state.is_configured() {
            match self.package.host_groups(&self.config) {
                Ok(groups) => self.host_groups = groups,
                Err(e) => debug!("{}: host groups not restored: {}", self.pkg_id, e),
            }
        }
        self
    }

    pub fn record(&self) -> PackageRecord {
        PackageRecord {
            id: self.pkg_id.clone(),
            package_type: self.package_type.clone(),
            repo: self.repo.clone(),
            state: self.state,
            config: self.config.clone(),
            env: self.env.clone(),
            last_transition: self.last_transition,
        }
    }

    pub fn id(&self) -> &str {
        &self.pkg_id
    }

    /// False when the package type was missing at load time
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_none()
    }

    /// Why the package type could not be constructed, if it could not
    pub fn unresolved_reason(&self) -> Option<&str> {
        self.unresolved.as_deref()
    }

    pub fn package_type(&self) -> &str {
        &self.package_type
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn class_name(&self) -> &str {
        self.package.class_name()
    }

    pub fn schema(&self) -> &ConfigurationSchema {
        &self.schema
    }

    pub fn paths(&self) -> &PackagePaths {
        &self.paths
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Host groups from the last configure or lifecycle call
    pub fn host_groups(&self) -> &[HostGroup] {
        &self.host_groups
    }

    pub fn last_transition(&self) -> Option<DateTime<Utc>> {
        self.last_transition
    }

    /// Resolve `params` against the menu and run the package's configure
    ///
    /// Reconfiguring starts from the current config, so only changed
    /// options need to be supplied. Validation happens before anything is
    /// dispatched.
    pub async fn configure(&mut self, runtime: Runtime<'_>, params: &ConfigMap) -> Result<()> {
        self.check(LifecycleAction::Configure)?;

        let mut supplied = if self.state.is_configured() {
            self.config.to_map()
        } else {
            ConfigMap::new()
        };
        supplied.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        let vars = self.paths.vars(&self.pkg_id);
        let config = self.schema.resolve(&supplied, &vars)?;
        debug!("Resolved {} options for {}", config.len(), self.pkg_id);

        let mut ctx = PackageContext {
            pkg_id: &self.pkg_id,
            runtime,
            paths: &self.paths,
            config,
            env: self.env.clone(),
            groups: Vec::new(),
        };
        if let Err(e) = self.package.configure(&mut ctx).await {
            warn!("Configure of {} failed; keeping previous state", self.pkg_id);
            return Err(e);
        }
        let groups = self.package.host_groups(&ctx.config)?;

        let PackageContext { config, env, .. } = ctx;
        self.config = config;
        self.env = env;
        self.host_groups = groups;
        self.transition(LifecycleAction::Configure);
        Ok(())
    }

    pub async fn start(&mut self, runtime: Runtime<'_>) -> Result<()> {
        self.check(LifecycleAction::Start)?;
        let groups = self.reload_config()?;
        self.package.start(&self.context(runtime, groups)).await?;
        self.transition(LifecycleAction::Start);
        Ok(())
    }

    pub async fn stop(&mut self, runtime: Runtime<'_>) -> Result<()> {
        self.check(LifecycleAction::Stop)?;
        let groups = self.reload_config()?;
        self.package.stop(&self.context(runtime, groups)).await?;
        self.transition(LifecycleAction::Stop);
        Ok(())
    }

    /// Remove package data; repeating a clean is not an error
    pub async fn clean(&mut self, runtime: Runtime<'_>) -> Result<()> {
        self.check(LifecycleAction::Clean)?;
        let groups = self.reload_config()?;
        self.package.clean(&self.context(runtime, groups)).await?;
        self.transition(LifecycleAction::Clean);
        Ok(())
    }

    pub async fn status(&mut self, runtime: Runtime<'_>) -> Result<bool> {
        self.check(LifecycleAction::Status)?;
        let groups = self.reload_config()?;
        self.package.status(&self.context(runtime, groups)).await
    }

    fn check(&self, action: LifecycleAction) -> Result<()> {
        if action != LifecycleAction::Configure && !self.state.is_configured() {
            return Err(Error::not_configured(&self.pkg_id));
        }
        if !self.state.permits(action) {
            return Err(Error::invalid_transition(
                &self.pkg_id,
                action.to_string(),
                self.state,
            ));
        }
        Ok(())
    }

    /// Re-derive host groups from the persisted config
    fn reload_config(&mut self) -> Result<Vec<HostGroup>> {
        let groups = self.package.host_groups(&self.config)?;
        if groups.iter().all(HostGroup::is_empty) {
            return Err(Error::not_configured(&self.pkg_id));
        }
        self.host_groups = groups.clone();
        Ok(groups)
    }

    fn context<'s>(&'s self, runtime: Runtime<'s>, groups: Vec<HostGroup>) -> PackageContext<'s> {
        PackageContext {
            pkg_id: &self.pkg_id,
            runtime,
            paths: &self.paths,
            config: self.config.clone(),
            env: self.env.clone(),
            groups,
        }
    }

    fn transition(&mut self, action: LifecycleAction) {
        let from = self.state;
        self.state = from.after(action);
        self.last_transition = Some(Utc::now());
        info!("{}: {} -> {}", self.pkg_id, from, self.state);
    }
}

impl fmt::Debug for PackageInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageInstance")
            .field("pkg_id", &self.pkg_id)
            .field("package_type", &self.package_type)
            .field("repo", &self.repo)
            .field("state", &self.state)
            .field("unresolved", &self.unresolved)
            .finish_non_exhaustive()
    }
}

/// Stand-in for a package type that no repository provides any more
struct Unresolved {
    package_type: String,
}

impl Unresolved {
    fn missing<T>(&self) -> Result<T> {
        Err(Error::package_not_found(&self.package_type))
    }
}

#[async_trait]
impl Package for Unresolved {
    fn class_name(&self) -> &str {
        &self.package_type
    }

    fn configure_menu(&self) -> ConfigurationSchema {
        ConfigurationSchema::default()
    }

    fn host_groups(&self, _config: &ResolvedConfig) -> Result<Vec<HostGroup>> {
        self.missing()
    }

    async fn configure(&self, _ctx: &mut PackageContext<'_>) -> Result<()> {
        self.missing()
    }

    async fn start(&self, _ctx: &PackageContext<'_>) -> Result<()> {
        self.missing()
    }

    async fn stop(&self, _ctx: &PackageContext<'_>) -> Result<()> {
        self.missing()
    }

    async fn clean(&self, _ctx: &PackageContext<'_>) -> Result<()> {
        self.missing()
    }

    async fn status(&self, _ctx: &PackageContext<'_>) -> Result<bool> {
        self.missing()
    }
}
