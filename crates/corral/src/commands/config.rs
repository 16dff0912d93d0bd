//! Config command

use anyhow::Result;
use corral_core::ConfigStore;

use crate::cli::ConfigCommands;
use crate::commands::load_manager;

pub async fn run(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(),
        ConfigCommands::Path => path(),
    }
}

fn path() -> Result<()> {
    let store = ConfigStore::new()?;
    println!("{}", store.config_path().display());
    Ok(())
}

fn show() -> Result<()> {
    let manager = load_manager()?;
    print!("{}", manager.print_config()?);
    Ok(())
}
