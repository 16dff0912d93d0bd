//! Package manifests (package.yaml)
//!
//! A package-type directory describes itself with a `package.yaml`:
//!
//! ```yaml
//! class: HelloServer            # CamelCase of the directory name
//! kind: scripted                # or `builtin` for compiled-in packages
//! menu:
//!   - name: port
//!     type: int
//!     default: 8080
//! roles:
//!   - name: server
//!     count: 1                  # first N hosts; omit for all hosts
//!   - name: client
//! env:
//!   HELLO_PORT: "{{ port }}"
//! commands:
//!   configure:
//!     - role: server
//!       mkdir: ["{{ private_dir }}/data"]
//!   start:
//!     - role: server
//!       run: hello-server --port {{ port }} --host {{ host }}
//!   clean:
//!     - role: server
//!       remove: ["{{ private_dir }}/data"]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use corral_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::schema::ConfigurationSchema;

/// File name of a package manifest
pub const MANIFEST_FILE: &str = "package.yaml";

/// How a package is implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// Command templates declared in the manifest
    #[default]
    Scripted,
    /// Compiled into corral and registered for the repository
    Builtin,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Scripted => write!(f, "scripted"),
            PackageKind::Builtin => write!(f, "builtin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub class: String,

    #[serde(default)]
    pub kind: PackageKind,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub menu: ConfigurationSchema,

    #[serde(default)]
    pub roles: Vec<RoleSpec>,

    /// Variables exported into the package env on configure (templated)
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub commands: LifecycleCommands,
}

/// A host role and how it is carved out of the hostfile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,

    /// Take the first `count` hosts; all hosts when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleCommands {
    #[serde(default)]
    pub configure: Vec<CommandStep>,
    #[serde(default)]
    pub start: Vec<CommandStep>,
    #[serde(default)]
    pub stop: Vec<CommandStep>,
    #[serde(default)]
    pub clean: Vec<CommandStep>,
    #[serde(default)]
    pub status: Vec<CommandStep>,
}

impl LifecycleCommands {
    fn all(&self) -> impl Iterator<Item = &CommandStep> {
        self.configure
            .iter()
            .chain(&self.start)
            .chain(&self.stop)
            .chain(&self.clean)
            .chain(&self.status)
    }
}

/// One primitive against one role; exactly one action field is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandStep {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copy: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mkdir: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
}

impl CommandStep {
    fn action_count(&self) -> usize {
        [
            self.run.is_some(),
            !self.copy.is_empty(),
            !self.mkdir.is_empty(),
            !self.remove.is_empty(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

impl PackageManifest {
    /// Load and validate `<dir>/package.yaml`
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)?;
        let manifest: PackageManifest = serde_yaml_ng::from_str(&content).map_err(|e| {
            Error::invalid_config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.kind == PackageKind::Builtin {
            return Ok(());
        }
        if self.roles.is_empty() {
            return Err(Error::invalid_config(format!(
                "package {} declares no roles",
                self.class
            )));
        }
        for (i, role) in self.roles.iter().enumerate() {
            if self.roles[..i].iter().any(|r| r.name == role.name) {
                return Err(Error::invalid_config(format!(
                    "package {} declares role '{}' twice",
                    self.class, role.name
                )));
            }
        }
        for step in self.commands.all() {
            if self.role(&step.role).is_none() {
                return Err(Error::invalid_config(format!(
                    "package {} has a command for undeclared role '{}'",
                    self.class, step.role
                )));
            }
            if step.action_count() != 1 {
                return Err(Error::invalid_config(format!(
                    "package {}: each command step needs exactly one of run, copy, mkdir, remove",
                    self.class
                )));
            }
        }
        Ok(())
    }
}
