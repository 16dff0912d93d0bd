//! Bootstrap command

use anyhow::{Context, Result};
use corral_core::ConfigStore;
use corral_dispatch::default_transport;
use corral_pipeline::{PipelineManager, LOCAL_MACHINE};

use crate::cli::BootstrapArgs;
use crate::output;

pub async fn run(args: BootstrapArgs) -> Result<()> {
    let store = ConfigStore::new()?;
    let Some(machine) = args.machine else {
        return list(&store);
    };

    if store.is_initialized() {
        output::warning(&format!("Overwriting {}", store.config_path().display()));
    }
    let manager = PipelineManager::bootstrap_from(store, &machine, default_transport())
        .with_context(|| format!("Failed to bootstrap from {}", machine))?;

    output::success(&format!("Bootstrapped corral for {}", machine));
    let config = manager.config();
    output::kv("config_dir", &config.config_dir);
    output::kv("private_dir", &config.private_dir);
    if let Some(shared) = &config.shared_dir {
        output::kv("shared_dir", shared);
    }
    if !manager.resource_graph().is_empty() {
        output::kv("resource graph", &format!("{} hosts", manager.resource_graph().hosts().len()));
    }
    Ok(())
}

fn list(store: &ConfigStore) -> Result<()> {
    output::header("Machines");
    println!("  {}", LOCAL_MACHINE);
    for machine in PipelineManager::bootstrap_list(store)? {
        println!("  {}", machine);
    }
    Ok(())
}
