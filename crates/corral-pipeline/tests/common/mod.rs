//! Common test utilities for corral-pipeline

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use corral_core::{ConfigStore, CorralConfig, Env};
use corral_dispatch::{CommandOutput, HostTransport};
use corral_pipeline::PipelineManager;
use tempfile::TempDir;

/// Records every call as `host: detail`; fails calls matching a rule
#[derive(Default)]
pub struct MockTransport {
    failures: Mutex<Vec<(String, String)>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, host: &str, needle: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((host.to_string(), needle.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Details of calls containing `needle`, in issue order
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, detail)| detail.contains(needle))
            .map(|(_, detail)| detail)
            .collect()
    }

    fn record(&self, host: &str, detail: String) -> CommandOutput {
        let failed = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|(h, needle)| h == host && detail.contains(needle.as_str()));
        self.calls.lock().unwrap().push((host.to_string(), detail));
        if failed {
            CommandOutput::failure(1, "mock failure")
        } else {
            CommandOutput::success("")
        }
    }
}

fn join(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl HostTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, host: &str, command: &str, _env: &Env) -> corral_core::Result<CommandOutput> {
        Ok(self.record(host, command.to_string()))
    }

    async fn copy(&self, paths: &[PathBuf], host: &str) -> corral_core::Result<CommandOutput> {
        Ok(self.record(host, format!("copy {}", join(paths))))
    }

    async fn mkdir(
        &self,
        paths: &[PathBuf],
        host: &str,
        _env: &Env,
    ) -> corral_core::Result<CommandOutput> {
        Ok(self.record(host, format!("mkdir {}", join(paths))))
    }

    async fn remove(
        &self,
        paths: &[PathBuf],
        host: &str,
        _env: &Env,
    ) -> corral_core::Result<CommandOutput> {
        Ok(self.record(host, format!("remove {}", join(paths))))
    }
}

/// A scripted package whose commands name the package id
pub const ECHO_MANIFEST: &str = r#"
class: EchoService
menu:
  - name: greeting
    type: str
    default: hello
roles:
  - name: server
commands:
  start:
    - role: server
      run: echo-start {{ pkg_id }} {{ greeting }}
  stop:
    - role: server
      run: echo-stop {{ pkg_id }}
  clean:
    - role: server
      remove: ["{{ private_dir }}"]
  status:
    - role: server
      run: echo-status {{ pkg_id }}
"#;

/// A corral home, a hostfile and a scripted repository in one temp dir
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

    pub fn store(&self) -> ConfigStore {
        ConfigStore::with_dir(self.temp_path().join("home"))
    }

    pub fn config(&self) -> CorralConfig {
        CorralConfig::new(
            self.temp_path().join("config").display().to_string(),
            self.temp_path().join("private").display().to_string(),
            Some(self.temp_path().join("shared").display().to_string()),
        )
    }

    /// Write a hostfile and return its path
    pub fn hostfile(&self, content: &str) -> Result<PathBuf> {
        let path = self.temp_path().join("hostfile");
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// A repository `site` holding the `echo_service` scripted package
    pub fn echo_repo(&self) -> Result<PathBuf> {
        let repo = self.temp_path().join("site");
        let dir = repo.join("site").join("echo_service");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("package.yaml"), ECHO_MANIFEST)?;
        Ok(repo)
    }

    /// Initialized manager with the echo repository and a hostfile
    pub fn manager(&self, transport: Arc<MockTransport>, hosts: &str) -> Result<PipelineManager> {
        let mut manager = PipelineManager::create(self.store(), self.config(), transport)?;
        manager.add_repo(self.echo_repo()?, false)?;
        let hostfile = self.hostfile(hosts)?;
        manager.set_hostfile(hostfile.to_str().context("non-utf8 path")?)?;
        manager.save()?;
        Ok(manager)
    }
}
