//! Init command

use anyhow::{Context, Result};
use corral_core::{ConfigStore, CorralConfig};
use corral_dispatch::default_transport;
use corral_pipeline::PipelineManager;

use crate::cli::InitArgs;
use crate::output;

pub async fn run(args: InitArgs) -> Result<()> {
    let store = ConfigStore::new()?;
    if store.is_initialized() {
        output::warning(&format!(
            "Reinitializing {}; repositories and the resource graph are kept",
            store.home().display()
        ));
    }

    let mut config = CorralConfig::new(args.config_dir, args.private_dir, args.shared_dir);
    if let Some(timeout) = args.timeout {
        config.command_timeout_secs = timeout;
    }

    let mut manager = PipelineManager::create(store, config, default_transport())
        .context("Failed to initialize corral")?;
    manager.save()?;

    output::success(&format!("Initialized {}", manager.store().home().display()));
    let config = manager.config();
    output::kv("config_dir", &config.config_dir);
    output::kv("private_dir", &config.private_dir);
    if let Some(shared) = &config.shared_dir {
        output::kv("shared_dir", shared);
    }
    Ok(())
}
