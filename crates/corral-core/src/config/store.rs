//! The corral home directory and the documents persisted in it
//!
//! Layout (default `~/.corral`, overridable with `CORRAL_HOME`):
//! ```text
//! corral.yaml            # directories, hostfile, current pipeline
//! repos.yaml             # ordered repository list
//! resource_graph.yaml    # last introspected topology
//! builtin/builtin/...    # the builtin repository
//! ```
//!
//! Environment variables applied on top of `corral.yaml` when loading:
//! - `CORRAL_COMMAND_TIMEOUT_SECS`
//! - `CORRAL_HOSTFILE`

use std::env;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::Repository;
use crate::utils::{expand_path, get_home_dir};

/// Name of the repository shipped with corral
pub const BUILTIN_REPO: &str = "builtin";

/// Directory under `config_dir` reserved for named environments
pub const ENV_DIR_NAME: &str = "env";

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

fn default_timeout() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

/// The per-user corral configuration (corral.yaml)
///
/// Directory fields keep the user's spelling (`$SCRATCH/corral`) and are
/// expanded on access, so the file stays portable across machines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorralConfig {
    /// Where pipeline metadata is stored
    pub config_dir: String,

    /// Per-host directory private to each package
    pub private_dir: String,

    /// Directory with the same view on every host
    #[serde(default)]
    pub shared_dir: Option<String>,

    #[serde(default)]
    pub hostfile: Option<PathBuf>,

    #[serde(default)]
    pub current_pipeline: Option<String>,

    /// Per-host timeout for every dispatched command
    #[serde(default = "default_timeout")]
    pub command_timeout_secs: u64,
}

impl CorralConfig {
    pub fn new(
        config_dir: impl Into<String>,
        private_dir: impl Into<String>,
        shared_dir: Option<String>,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            private_dir: private_dir.into(),
            shared_dir,
            hostfile: None,
            current_pipeline: None,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }

    pub fn config_dir(&self) -> Result<PathBuf> {
        expand_path(&self.config_dir)
    }

    pub fn private_dir(&self) -> Result<PathBuf> {
        expand_path(&self.private_dir)
    }

    pub fn shared_dir(&self) -> Result<Option<PathBuf>> {
        self.shared_dir.as_deref().map(expand_path).transpose()
    }

    /// Directory holding one pipeline's metadata
    pub fn pipeline_dir(&self, pipeline_id: &str) -> Result<PathBuf> {
        Ok(self.config_dir()?.join(pipeline_id))
    }
}

/// Reads and writes the documents under the corral home directory
#[derive(Debug, Clone)]
pub struct ConfigStore {
    home: PathBuf,
}

impl ConfigStore {
    /// Open the store at `$CORRAL_HOME` or `~/.corral`
    pub fn new() -> Result<Self> {
        let home = match env::var("CORRAL_HOME") {
            Ok(dir) if !dir.is_empty() => expand_path(&dir)?,
            _ => get_home_dir()?.join(".corral"),
        };
        Ok(Self { home })
    }

    /// Open the store rooted at a custom directory
    pub fn with_dir(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("corral.yaml")
    }

    pub fn repos_path(&self) -> PathBuf {
        self.home.join("repos.yaml")
    }

    pub fn resource_graph_path(&self) -> PathBuf {
        self.home.join("resource_graph.yaml")
    }

    pub fn builtin_dir(&self) -> PathBuf {
        self.home.join(BUILTIN_REPO)
    }

    /// Machine presets shipped with the builtin repository
    pub fn machines_dir(&self) -> PathBuf {
        self.builtin_dir().join("config")
    }

    pub fn machine_config_path(&self, machine: &str) -> PathBuf {
        self.machines_dir().join(format!("{}.yaml", machine))
    }

    pub fn machine_resource_graph_path(&self, machine: &str) -> PathBuf {
        self.builtin_dir()
            .join("resource_graph")
            .join(format!("{}.yaml", machine))
    }

    /// Machines with a preset corral.yaml, sorted
    pub fn list_machines(&self) -> Result<Vec<String>> {
        let dir = self.machines_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut machines = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "yaml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    machines.push(stem.to_string());
                }
            }
        }
        machines.sort();
        Ok(machines)
    }

    /// True once `corral init` has written corral.yaml
    pub fn is_initialized(&self) -> bool {
        self.config_path().exists()
    }

    /// Load corral.yaml and apply environment overrides
    pub fn load_config(&self) -> Result<CorralConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Err(Error::config_not_found(path.display()));
        }
        let config: CorralConfig = load_yaml(&path)?;
        self.apply_env_overrides(config)
    }

    pub fn save_config(&self, config: &CorralConfig) -> Result<()> {
        save_yaml(&self.config_path(), config)?;
        debug!("Saved configuration to {:?}", self.config_path());
        Ok(())
    }

    /// Load the ordered repository list, defaulting to the builtin repo
    pub fn load_repos(&self) -> Result<Vec<Repository>> {
        let path = self.repos_path();
        if !path.exists() {
            debug!("No repos.yaml; using the builtin repository only");
            return Ok(vec![Repository::new(BUILTIN_REPO, self.builtin_dir())]);
        }
        let file: ReposFile = load_yaml(&path)?;
        debug!("Loaded {} repositories", file.repos.len());
        Ok(file.repos)
    }

    pub fn save_repos(&self, repos: &[Repository]) -> Result<()> {
        save_yaml(
            &self.repos_path(),
            &ReposFile {
                repos: repos.to_vec(),
            },
        )
    }

    /// Write a fresh store, creating the home directory
    pub fn initialize(&self, config: &CorralConfig) -> Result<()> {
        std::fs::create_dir_all(&self.home)?;
        self.save_config(config)?;
        info!("Initialized corral home at {:?}", self.home);
        Ok(())
    }

    fn apply_env_overrides(&self, mut config: CorralConfig) -> Result<CorralConfig> {
        if let Ok(val) = env::var("CORRAL_COMMAND_TIMEOUT_SECS") {
            config.command_timeout_secs = val.parse().map_err(|_| {
                Error::invalid_config("CORRAL_COMMAND_TIMEOUT_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("CORRAL_HOSTFILE") {
            config.hostfile = if val.is_empty() {
                None
            } else {
                Some(expand_path(&val)?)
            };
        }

        Ok(config)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ReposFile {
    repos: Vec<Repository>,
}

/// Load a YAML document
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml_ng::from_str(&content)
        .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Save a YAML document, creating parent directories
pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_yaml_ng::to_string(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn sample_config(root: &Path) -> CorralConfig {
        CorralConfig::new(
            root.join("config").display().to_string(),
            root.join("private").display().to_string(),
            Some(root.join("shared").display().to_string()),
        )
    }

    #[test]
    #[serial]
    fn test_load_before_init_is_config_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        assert!(!store.is_initialized());
        assert!(matches!(
            store.load_config(),
            Err(Error::ConfigNotFound { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_initialize_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path().join("home"));
        let config = sample_config(dir.path());
        store.initialize(&config).unwrap();

        let loaded = store.load_config().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        store.initialize(&sample_config(dir.path())).unwrap();

        env::set_var("CORRAL_COMMAND_TIMEOUT_SECS", "42");
        env::set_var("CORRAL_HOSTFILE", "/etc/corral/hosts");
        let loaded = store.load_config();
        env::remove_var("CORRAL_COMMAND_TIMEOUT_SECS");
        env::remove_var("CORRAL_HOSTFILE");

        let loaded = loaded.unwrap();
        assert_eq!(loaded.command_timeout_secs, 42);
        assert_eq!(loaded.hostfile, Some(PathBuf::from("/etc/corral/hosts")));
    }

    #[test]
    #[serial]
    fn test_bad_timeout_override() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        store.initialize(&sample_config(dir.path())).unwrap();

        env::set_var("CORRAL_COMMAND_TIMEOUT_SECS", "soon");
        let result = store.load_config();
        env::remove_var("CORRAL_COMMAND_TIMEOUT_SECS");

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_list_machines() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        assert!(store.list_machines().unwrap().is_empty());

        std::fs::create_dir_all(store.machines_dir()).unwrap();
        std::fs::write(store.machine_config_path("polaris"), "config_dir: /c\n").unwrap();
        std::fs::write(store.machine_config_path("ares"), "config_dir: /c\n").unwrap();
        std::fs::write(store.machines_dir().join("README.md"), "notes").unwrap();

        assert_eq!(store.list_machines().unwrap(), vec!["ares", "polaris"]);
        assert_eq!(
            store.machine_resource_graph_path("ares"),
            dir.path().join("builtin").join("resource_graph").join("ares.yaml")
        );
    }

    #[test]
    fn test_repos_default_to_builtin() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        let repos = store.load_repos().unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, BUILTIN_REPO);
        assert_eq!(repos[0].path, dir.path().join("builtin"));
    }

    #[test]
    fn test_repos_roundtrip_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path());
        let repos = vec![
            Repository::new("b", "/repos/b"),
            Repository::new("a", "/repos/a"),
        ];
        store.save_repos(&repos).unwrap();
        assert_eq!(store.load_repos().unwrap(), repos);
    }
}
