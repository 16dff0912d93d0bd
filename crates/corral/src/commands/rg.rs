//! Resource graph commands

use anyhow::Result;
use corral_core::ResourceGraph;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::{RgCommands, RgShowArgs};
use crate::commands::{load_manager, save_manager};
use crate::output;

pub async fn run(cmd: RgCommands) -> Result<()> {
    match cmd {
        RgCommands::Build => probe(false).await,
        RgCommands::Modify => probe(true).await,
        RgCommands::Show(args) => show(args),
    }
}

async fn probe(modify: bool) -> Result<()> {
    let mut manager = load_manager()?;
    let spinner = output::spinner(&format!(
        "Probing {} hosts...",
        manager.hostfile().len()
    ));
    let result = if modify {
        manager.modify_resource_graph().await.map(|_| ())
    } else {
        manager.build_resource_graph().await.map(|_| ())
    };
    spinner.finish_and_clear();
    result?;
    save_manager(&mut manager)?;

    let graph = manager.resource_graph();
    output::success(&format!(
        "Resource graph covers {} hosts ({} filesystems, {} interfaces)",
        graph.hosts().len(),
        graph.fs.len(),
        graph.net.len()
    ));
    Ok(())
}

#[derive(Tabled)]
struct FsRow {
    host: String,
    mount: String,
    #[tabled(rename = "type")]
    fs_type: String,
    device: String,
    #[tabled(rename = "avail (GiB)")]
    avail: String,
}

#[derive(Tabled)]
struct NetRow {
    host: String,
    interface: String,
    address: String,
}

fn show(args: RgShowArgs) -> Result<()> {
    let manager = load_manager()?;
    let graph = manager.resource_graph();

    if graph.is_empty() {
        output::warning("The resource graph is empty; run `corral rg build`");
        return Ok(());
    }
    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(graph)?);
        return Ok(());
    }
    print_tables(graph);
    Ok(())
}

fn print_tables(graph: &ResourceGraph) {
    let fs_rows: Vec<FsRow> = graph
        .fs
        .iter()
        .map(|e| FsRow {
            host: e.host.clone(),
            mount: e.mount.clone(),
            fs_type: e.fs_type.clone(),
            device: e.device.clone(),
            avail: format!("{:.1}", e.avail_kb as f64 / (1024.0 * 1024.0)),
        })
        .collect();
    output::header("Filesystems");
    let mut table = Table::new(fs_rows);
    table.with(Style::sharp());
    println!("{}", table);

    let net_rows: Vec<NetRow> = graph
        .net
        .iter()
        .map(|e| NetRow {
            host: e.host.clone(),
            interface: e.interface.clone(),
            address: format!("{}/{}", e.ip, e.prefix_len),
        })
        .collect();
    output::header("Network");
    let mut table = Table::new(net_rows);
    table.with(Style::sharp());
    println!("{}", table);
}
