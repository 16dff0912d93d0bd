//! Hostfile command

use anyhow::Result;

use crate::cli::{HostfileCommands, HostfileSetArgs};
use crate::commands::{load_manager, save_manager};
use crate::output;

pub async fn run(cmd: HostfileCommands) -> Result<()> {
    match cmd {
        HostfileCommands::Set(args) => set(args),
        HostfileCommands::Show => show(),
    }
}

fn set(args: HostfileSetArgs) -> Result<()> {
    let mut manager = load_manager()?;
    manager.set_hostfile(args.path.as_deref().unwrap_or(""))?;
    save_manager(&mut manager)?;

    let hostfile = manager.hostfile();
    match hostfile.path() {
        Some(path) => output::success(&format!(
            "Using {} ({} hosts)",
            path.display(),
            hostfile.len()
        )),
        None => output::success("Using localhost"),
    }
    output::info("Run `corral rg build` to refresh the resource graph");
    Ok(())
}

fn show() -> Result<()> {
    let manager = load_manager()?;
    let hostfile = manager.hostfile();
    if let Some(path) = hostfile.path() {
        output::kv("path", &path.display().to_string());
    }
    for host in hostfile.hosts() {
        println!("{}", host);
    }
    Ok(())
}
