//! An ordered, persisted collection of package instances

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use corral_core::config::{load_yaml, save_yaml};
use corral_core::{CorralConfig, Error, Result};
use corral_packages::{PackageInstance, PackagePaths, PackageRecord, PackageRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// File holding a pipeline's package records
pub const PIPELINE_FILE: &str = "pipeline.yaml";

#[derive(Debug, Serialize, Deserialize)]
struct PipelineFile {
    id: String,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    #[serde(default)]
    packages: Vec<PackageRecord>,
}

/// Package instances in execution order
#[derive(Debug)]
pub struct Pipeline {
    id: String,
    dir: PathBuf,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    pub(crate) packages: Vec<PackageInstance>,
}

impl Pipeline {
    /// An empty pipeline stored under `dir`
    pub fn new(id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            dir: dir.into(),
            created_at: now,
            last_updated: now,
            packages: Vec::new(),
        }
    }

    /// True when `dir` holds a saved pipeline
    pub fn exists(dir: &Path) -> bool {
        dir.join(PIPELINE_FILE).is_file()
    }

    /// Restore a pipeline, reconstructing each package through the registry
    ///
    /// A package whose type no longer resolves is kept as an unresolved
    /// entry; only operations that reach it fail.
    pub fn load(id: &str, config: &CorralConfig, registry: &PackageRegistry) -> Result<Self> {
        let dir = config.pipeline_dir(id)?;
        let path = dir.join(PIPELINE_FILE);
        if !path.is_file() {
            return Err(Error::PipelineNotFound { id: id.to_string() });
        }
        let file: PipelineFile = load_yaml(&path)?;

        let mut packages = Vec::with_capacity(file.packages.len());
        for record in file.packages {
            let paths = PackagePaths::for_package(config, id, &record.id)?;
            let instance = match registry.construct(&record.package_type) {
                Ok(instance) => instance,
                Err(e) => {
                    warn!("{}: cannot construct {}: {}", record.id, record.package_type, e);
                    let reason = e.to_string();
                    packages.push(PackageInstance::unresolved(record, reason).with_paths(paths));
                    continue;
                }
            };
            if instance.repo() != record.repo {
                warn!(
                    "{}: {} now resolves to repository {} (was {})",
                    record.id,
                    record.package_type,
                    instance.repo(),
                    record.repo
                );
            }
            packages.push(instance.with_paths(paths).restore(record));
        }
        debug!("Loaded pipeline {} with {} packages", id, packages.len());

        Ok(Self {
            id: file.id,
            dir,
            created_at: file.created_at,
            last_updated: file.last_updated,
            packages,
        })
    }

    pub fn save(&self) -> Result<()> {
        let file = PipelineFile {
            id: self.id.clone(),
            created_at: self.created_at,
            last_updated: Utc::now(),
            packages: self.packages.iter().map(PackageInstance::record).collect(),
        };
        save_yaml(&self.path(), &file)?;
        debug!("Saved pipeline {} to {:?}", self.id, self.path());
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(PIPELINE_FILE)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn packages(&self) -> &[PackageInstance] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn contains(&self, pkg_id: &str) -> bool {
        self.packages.iter().any(|p| p.id() == pkg_id)
    }

    /// Add a package at the end of the pipeline
    pub fn append(&mut self, instance: PackageInstance) -> Result<&mut PackageInstance> {
        if self.contains(instance.id()) {
            return Err(Error::DuplicatePackageId {
                pipeline: self.id.clone(),
                id: instance.id().to_string(),
            });
        }
        info!("Appended {} ({}) to pipeline {}", instance.id(), instance.package_type(), self.id);
        self.packages.push(instance);
        self.last_updated = Utc::now();
        let last = self.packages.len() - 1;
        Ok(&mut self.packages[last])
    }

    pub fn get(&self, pkg_id: &str) -> Result<&PackageInstance> {
        self.packages
            .iter()
            .find(|p| p.id() == pkg_id)
            .ok_or_else(|| self.not_found(pkg_id))
    }

    pub fn get_mut(&mut self, pkg_id: &str) -> Result<&mut PackageInstance> {
        let index = self.position(pkg_id)?;
        Ok(&mut self.packages[index])
    }

    /// Drop a package from the pipeline; nothing is cleaned
    pub fn remove(&mut self, pkg_id: &str) -> Result<PackageInstance> {
        let index = self.position(pkg_id)?;
        self.last_updated = Utc::now();
        Ok(self.packages.remove(index))
    }

    fn position(&self, pkg_id: &str) -> Result<usize> {
        self.packages
            .iter()
            .position(|p| p.id() == pkg_id)
            .ok_or_else(|| self.not_found(pkg_id))
    }

    fn not_found(&self, pkg_id: &str) -> Error {
        Error::PackageIdNotFound {
            pipeline: self.id.clone(),
            id: pkg_id.to_string(),
        }
    }
}
