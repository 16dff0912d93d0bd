//! Package repository records

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A directory tree of packages, searched in priority order
///
/// The layout is `<path>/<name>/<package_type>/`, so the repository
/// carries its own namespace directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub path: PathBuf,
}

impl Repository {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// The self-named namespace directory holding package types
    pub fn namespace_dir(&self) -> PathBuf {
        self.path.join(&self.name)
    }

    /// Directory of a single package type
    pub fn package_dir(&self, package_type: &str) -> PathBuf {
        self.namespace_dir().join(package_type)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
