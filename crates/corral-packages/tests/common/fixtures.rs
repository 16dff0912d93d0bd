//! Test fixtures: repositories on disk and a wired-up runtime
//!
//! Everything lives under one `TempDir` that is removed when the
//! `FixtureManager` is dropped.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use corral_core::{Hostfile, ResourceGraph};
use corral_dispatch::HostGroupDispatcher;
use corral_packages::{PackagePaths, Runtime};
use tempfile::TempDir;

use super::mocks::MockTransport;

/// A scripted manifest with one `server` role and a port option
pub const HELLO_MANIFEST: &str = r#"
class: HelloServer
menu:
  - name: port
    type: int
    default: 8080
  - name: data_dir
    type: str
    default: "${private_dir}/data"
roles:
  - name: server
    count: 1
  - name: client
env:
  HELLO_PORT: "{{ port }}"
commands:
  configure:
    - role: server
      mkdir: ["{{ data_dir }}"]
  start:
    - role: server
      run: hello-server --port {{ port }} --bind {{ host }}
    - role: client
      run: hello-client --server {{ server_host_set | first }}
  stop:
    - role: server
      run: pkill hello-server
  clean:
    - role: server
      remove: ["{{ data_dir }}"]
  status:
    - role: server
      run: pgrep hello-server
"#;

/// Fixture manager for repositories and package directories
pub struct FixtureManager {
    temp_dir: TempDir,
}

impl FixtureManager {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temp directory")?;
        Ok(Self { temp_dir })
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create `<tmp>/<name>/<name>/` and return the repository path
    pub fn create_repo(&self, name: &str) -> Result<PathBuf> {
        let path = self.temp_path().join(name);
        std::fs::create_dir_all(path.join(name))
            .with_context(|| format!("Failed to create repository {}", name))?;
        Ok(path)
    }

    /// A directory that is not a valid repository (no namespace subdirectory)
    pub fn create_bare_dir(&self, name: &str) -> Result<PathBuf> {
        let path = self.temp_path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Write `<repo>/<repo_name>/<package_type>/package.yaml`
    pub fn write_manifest(
        &self,
        repo_path: &Path,
        package_type: &str,
        content: &str,
    ) -> Result<PathBuf> {
        let repo_name = repo_path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Repository path has no name")?;
        let dir = repo_path.join(repo_name).join(package_type);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("package.yaml"), content)
            .context("Failed to write package.yaml")?;
        Ok(dir)
    }

    /// A minimal scripted manifest for `package_type`
    pub fn write_simple_package(&self, repo_path: &Path, package_type: &str) -> Result<PathBuf> {
        let class = corral_core::to_camel_case(package_type);
        let content = format!(
            "class: {}\nroles:\n  - name: server\ncommands:\n  start:\n    - role: server\n      run: echo {}\n",
            class, package_type
        );
        self.write_manifest(repo_path, package_type, &content)
    }

    /// Package directories rooted in the temp dir
    pub fn package_paths(&self, pipeline_id: &str, pkg_id: &str) -> PackagePaths {
        let under = |kind: &str| self.temp_path().join(kind).join(pipeline_id).join(pkg_id);
        PackagePaths {
            config_dir: under("config"),
            private_dir: under("private"),
            shared_dir: Some(under("shared")),
        }
    }
}

/// Dispatcher, hostfile and resource graph backed by a mock transport
pub struct TestRuntime {
    pub transport: Arc<MockTransport>,
    pub dispatcher: HostGroupDispatcher,
    pub hostfile: Hostfile,
    pub resource_graph: ResourceGraph,
}

impl TestRuntime {
    pub fn new(hosts: &[&str]) -> Self {
        let transport = MockTransport::new();
        Self {
            dispatcher: HostGroupDispatcher::new(transport.clone()),
            transport,
            hostfile: Hostfile::from_hosts(hosts.iter().map(|h| h.to_string()).collect()),
            resource_graph: ResourceGraph::new(),
        }
    }

    pub fn runtime(&self) -> Runtime<'_> {
        Runtime::new(&self.dispatcher, &self.hostfile, &self.resource_graph)
    }
}
