//! Package discovery across prioritized repositories
//!
//! A repository is a directory holding a namespace subdirectory of its own
//! name, with one subdirectory per package type:
//!
//! ```text
//! /x/myrepo/                 # repository path, name = "myrepo"
//! └── myrepo/
//!     ├── hello_server/
//!     │   └── package.yaml   # class: HelloServer
//!     └── _templates/        # ignored
//! ```
//!
//! Lookup walks the repositories in priority order and the first one that
//! yields the package type wins, so earlier repositories shadow later ones.
//! Compiled-in packages are registered per repository name and take part in
//! the same walk.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use corral_core::{to_camel_case, Error, Repository, Result};
use tracing::{debug, info, warn};

use crate::builtin;
use crate::instance::PackageInstance;
use crate::manifest::{PackageKind, PackageManifest, MANIFEST_FILE};
use crate::package::Package;
use crate::scripted::ScriptedPackage;

/// Constructor for a compiled-in package
pub type PackageFactory = fn() -> Box<dyn Package>;

/// What `add` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// An existing entry now points at the new path
    Updated,
    /// The name was already registered and `force` was not given
    Unchanged,
}

/// The package types of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoListing {
    pub repo: Repository,
    /// False when the repository path no longer exists
    pub exists: bool,
    pub package_types: Vec<String>,
}

/// Where a package type resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub package_type: String,
    pub repo: String,
    pub kind: PackageKind,
    pub dir: PathBuf,
}

enum Source {
    Builtin(PackageFactory),
    Scripted(PackageManifest),
}

/// Ordered repository list plus the compiled-in package table
pub struct PackageRegistry {
    repos: Vec<Repository>,
    builtins: HashMap<(String, String), PackageFactory>,
}

impl PackageRegistry {
    /// A registry with no compiled-in packages
    pub fn new(repos: Vec<Repository>) -> Self {
        Self {
            repos,
            builtins: HashMap::new(),
        }
    }

    /// A registry with the packages shipped in the builtin repository
    pub fn with_builtins(repos: Vec<Repository>) -> Self {
        let mut registry = Self::new(repos);
        builtin::register(&mut registry);
        registry
    }

    /// Registration hook for compiled-in packages
    pub fn register(&mut self, repo: &str, package_type: &str, factory: PackageFactory) {
        debug!("Registered compiled-in package {}.{}", repo, package_type);
        self.builtins
            .insert((repo.to_string(), package_type.to_string()), factory);
    }

    pub fn repos(&self) -> &[Repository] {
        &self.repos
    }

    pub fn get_repo(&self, name: &str) -> Result<&Repository> {
        self.repos
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::repository_not_found(name))
    }

    /// Add a repository at highest priority
    ///
    /// The name is the path's base name. Re-adding a known name is a no-op
    /// unless `force` is set or the recorded path has disappeared, in which
    /// case the entry is repointed in place. Nothing is written to disk.
    pub fn add(&mut self, path: impl AsRef<Path>, force: bool) -> Result<AddOutcome> {
        let path = std::path::absolute(path.as_ref())?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::invalid_layout(path.display(), "path has no base name"))?
            .to_string();

        if let Some(existing) = self.repos.iter_mut().find(|r| r.name == name) {
            if existing.exists() && !force {
                warn!(
                    "Repository {} already exists at {}. Use --force to overwrite",
                    name,
                    existing.path.display()
                );
                return Ok(AddOutcome::Unchanged);
            }
            check_layout(&path, &name)?;
            info!("Updated repository {} to {}", name, path.display());
            existing.path = path;
            return Ok(AddOutcome::Updated);
        }

        check_layout(&path, &name)?;
        info!("Added repository {} at {}", name, path.display());
        self.repos.insert(0, Repository::new(name, path));
        Ok(AddOutcome::Added)
    }

    /// Move a repository to highest priority
    pub fn promote(&mut self, name: &str) -> Result<()> {
        let index = self.position(name)?;
        let repo = self.repos.remove(index);
        self.repos.insert(0, repo);
        debug!("Promoted repository {}", name);
        Ok(())
    }

    /// Drop a repository from the search list; its files are left alone
    pub fn remove(&mut self, name: &str) -> Result<Repository> {
        let index = self.position(name)?;
        let repo = self.repos.remove(index);
        info!("Removed repository {} (files at {} kept)", name, repo.path.display());
        Ok(repo)
    }

    /// Package types in one repository, sorted, skipping `_`-prefixed entries
    pub fn list_repo(&self, name: &str) -> Result<RepoListing> {
        let repo = self.get_repo(name)?;
        if !repo.exists() {
            warn!("Repository {} does not exist at {}", name, repo.path.display());
            return Ok(RepoListing {
                repo: repo.clone(),
                exists: false,
                package_types: Vec::new(),
            });
        }

        let mut types: Vec<String> = self
            .builtins
            .keys()
            .filter(|(r, _)| r == name)
            .map(|(_, t)| t.clone())
            .collect();
        let namespace = repo.namespace_dir();
        if namespace.is_dir() {
            for entry in std::fs::read_dir(&namespace)? {
                let entry = entry?;
                let file_name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() && !file_name.starts_with('_') {
                    types.push(file_name);
                }
            }
        }
        types.sort();
        types.dedup();

        Ok(RepoListing {
            repo: repo.clone(),
            exists: true,
            package_types: types,
        })
    }

    /// Every reachable package type with the repository it resolves to
    pub fn available(&self) -> Result<Vec<Discovered>> {
        let mut found: BTreeMap<String, Discovered> = BTreeMap::new();
        for repo in &self.repos {
            for package_type in self.list_repo(&repo.name)?.package_types {
                if found.contains_key(&package_type) {
                    continue;
                }
                if let Some(discovered) = self.discover_in(repo, &package_type)? {
                    found.insert(package_type, discovered);
                }
            }
        }
        Ok(found.into_values().collect())
    }

    /// Find the highest-priority repository providing `package_type`
    pub fn discover(&self, package_type: &str) -> Result<Discovered> {
        for repo in &self.repos {
            if let Some(discovered) = self.discover_in(repo, package_type)? {
                return Ok(discovered);
            }
        }
        Err(Error::package_not_found(package_type))
    }

    /// Build an unconfigured instance of `package_type`
    pub fn construct(&self, package_type: &str) -> Result<PackageInstance> {
        for repo in &self.repos {
            let Some(source) = self.source_in(repo, package_type)? else {
                continue;
            };
            let package: Box<dyn Package> = match source {
                Source::Builtin(factory) => factory(),
                Source::Scripted(manifest) => Box::new(ScriptedPackage::new(manifest)),
            };
            debug!("Constructed {} from repository {}", package_type, repo.name);
            return Ok(PackageInstance::new(package_type, &repo.name, package));
        }
        Err(Error::package_not_found(package_type))
    }

    fn discover_in(&self, repo: &Repository, package_type: &str) -> Result<Option<Discovered>> {
        Ok(self.source_in(repo, package_type)?.map(|source| Discovered {
            package_type: package_type.to_string(),
            repo: repo.name.clone(),
            kind: match source {
                Source::Builtin(_) => PackageKind::Builtin,
                Source::Scripted(_) => PackageKind::Scripted,
            },
            dir: repo.package_dir(package_type),
        }))
    }

    fn source_in(&self, repo: &Repository, package_type: &str) -> Result<Option<Source>> {
        let factory = self
            .builtins
            .get(&(repo.name.clone(), package_type.to_string()))
            .copied();
        let dir = repo.package_dir(package_type);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Ok(factory.map(Source::Builtin));
        }

        let manifest = PackageManifest::load(&dir)?;
        let class = to_camel_case(package_type);
        if manifest.class != class {
            warn!(
                "Skipping {}: declares class {} but the directory requires {}",
                dir.display(),
                manifest.class,
                class
            );
            return Ok(None);
        }
        match (manifest.kind, factory) {
            (PackageKind::Builtin, Some(factory)) => Ok(Some(Source::Builtin(factory))),
            (PackageKind::Builtin, None) => {
                warn!(
                    "Skipping {}: no compiled-in package {} for repository {}",
                    dir.display(),
                    class,
                    repo.name
                );
                Ok(None)
            }
            (PackageKind::Scripted, _) => Ok(Some(Source::Scripted(manifest))),
        }
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.repos
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| Error::repository_not_found(name))
    }
}

fn check_layout(path: &Path, name: &str) -> Result<()> {
    if path.join(name).is_dir() {
        Ok(())
    } else {
        Err(Error::invalid_layout(
            path.display(),
            format!("repository must contain a subdirectory named '{}'", name),
        ))
    }
}
