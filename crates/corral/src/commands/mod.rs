//! CLI command implementations

pub mod bootstrap;
pub mod config;
pub mod hostfile;
pub mod init;
pub mod ppl;
pub mod repo;
pub mod reset;
pub mod rg;

use anyhow::{Context, Result};
use corral_core::ConfigStore;
use corral_dispatch::{default_transport, SshTransport};
use corral_packages::ConfigMap;
use corral_pipeline::PipelineManager;
use serde_json::Value;
use tracing::{debug, warn};

/// Open the manager over the user's store
pub(crate) fn load_manager() -> Result<PipelineManager> {
    let store = ConfigStore::new()?;
    let manager = PipelineManager::load(store, default_transport())
        .context("Failed to load corral state (run `corral init` first)")?;
    debug!("{:?}", manager);
    if !manager.hostfile().is_local() {
        if let Err(e) = SshTransport::check_prerequisites() {
            warn!("{}", e);
        }
    }
    Ok(manager)
}

/// Persist the manager after a mutating command
pub(crate) fn save_manager(manager: &mut PipelineManager) -> Result<()> {
    manager.save().context("Failed to save corral state")
}

pub(crate) fn to_config_map(params: Vec<(String, Value)>) -> ConfigMap {
    params.into_iter().collect()
}
