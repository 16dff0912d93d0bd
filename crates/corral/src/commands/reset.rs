//! Reset command

use anyhow::Result;

use crate::cli::ResetArgs;
use crate::commands::{load_manager, save_manager};
use crate::output;

pub async fn run(args: ResetArgs) -> Result<()> {
    let mut manager = load_manager()?;
    let config = manager.config();

    if !args.force {
        output::warning("This deletes package data on every host:");
        output::kv("private_dir", &config.private_dir);
        if let Some(shared) = &config.shared_dir {
            output::kv("shared_dir", shared);
        }
        output::info("Re-run with --force to proceed");
        return Ok(());
    }

    let spinner = output::spinner(&format!(
        "Removing package data on {} hosts...",
        manager.hostfile().len()
    ));
    let result = manager.reset().await;
    spinner.finish_and_clear();
    result?;
    save_manager(&mut manager)?;

    output::success("Reset complete");
    Ok(())
}
