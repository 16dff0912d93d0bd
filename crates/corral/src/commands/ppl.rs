//! Pipeline commands

use anyhow::{anyhow, Result};
use corral_pipeline::{PipelineManager, StatusEntry};
use tabled::{settings::Style, Table, Tabled};

use crate::cli::{
    PkgIdArgs, PplAppendArgs, PplCommands, PplConfigureArgs, PplDestroyArgs, PplIdArgs,
    PplShowArgs,
};
use crate::commands::{load_manager, save_manager, to_config_map};
use crate::output;

pub async fn run(cmd: PplCommands) -> Result<()> {
    match cmd {
        PplCommands::Create(args) => create(args).await,
        PplCommands::Cd(args) => cd(args),
        PplCommands::List => list(),
        PplCommands::Show(args) => show(args),
        PplCommands::Append(args) => append(args).await,
        PplCommands::Rm(args) => rm(args),
        PplCommands::Configure(args) => configure(args).await,
        PplCommands::Start => sweep(Action::Start).await,
        PplCommands::Stop => sweep(Action::Stop).await,
        PplCommands::Clean => sweep(Action::Clean).await,
        PplCommands::Status => status().await,
        PplCommands::Destroy(args) => destroy(args).await,
        PplCommands::Orphans => orphans(),
    }
}

async fn create(args: PplIdArgs) -> Result<()> {
    let mut manager = load_manager()?;
    manager.create_pipeline(&args.id).await?;
    save_manager(&mut manager)?;
    output::success(&format!("Now on pipeline {}", args.id));
    Ok(())
}

fn cd(args: PplIdArgs) -> Result<()> {
    let mut manager = load_manager()?;
    let len = manager.cd(&args.id)?.len();
    save_manager(&mut manager)?;
    output::success(&format!("Now on pipeline {} ({} packages)", args.id, len));
    Ok(())
}

fn list() -> Result<()> {
    let manager = load_manager()?;
    let ids = manager.list_pipelines()?;
    if ids.is_empty() {
        output::info("No pipelines yet; create one with `corral ppl create <id>`");
        return Ok(());
    }
    let current = manager.current().map(|p| p.id());
    for id in ids {
        if Some(id.as_str()) == current {
            println!("* {}", console::style(id).bold());
        } else {
            println!("  {}", id);
        }
    }
    Ok(())
}

#[derive(Tabled)]
struct PackageRow {
    id: String,
    #[tabled(rename = "type")]
    package_type: String,
    repo: String,
    state: String,
    hosts: String,
}

fn show(args: PplShowArgs) -> Result<()> {
    let manager = load_manager()?;
    let pipeline = current_or_err(&manager)?;

    output::header(&format!("Pipeline {}", pipeline.id()));
    output::kv("created", &pipeline.created_at().to_rfc3339());
    output::kv("updated", &pipeline.last_updated().to_rfc3339());
    if pipeline.is_empty() {
        output::info("No packages; add one with `corral ppl append <type>`");
        return Ok(());
    }

    let rows: Vec<PackageRow> = pipeline
        .packages()
        .iter()
        .map(|pkg| PackageRow {
            id: pkg.id().to_string(),
            package_type: pkg.package_type().to_string(),
            repo: if pkg.is_resolved() {
                pkg.repo().to_string()
            } else {
                format!("{} (missing)", pkg.repo())
            },
            state: pkg.state().to_string(),
            hosts: pkg
                .host_groups()
                .iter()
                .map(|g| format!("{}={}", g.role, g.hosts.len()))
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);

    for pkg in pipeline.packages().iter().filter(|p| !p.is_resolved()) {
        output::warning(&format!(
            "{}: {}",
            pkg.id(),
            pkg.unresolved_reason().unwrap_or("package type not found")
        ));
    }

    if args.config {
        for pkg in pipeline.packages() {
            output::header(pkg.id());
            for (key, value) in pkg.config().iter() {
                output::kv(key, &value.to_string());
            }
        }
    }
    Ok(())
}

async fn append(args: PplAppendArgs) -> Result<()> {
    let mut manager = load_manager()?;
    let params = to_config_map(args.params);

    let spinner = output::spinner(&format!("Configuring {}...", args.package_type));
    let result = manager
        .append(&args.package_type, args.id.as_deref(), &params)
        .await
        .map(|pkg| pkg.id().to_string());
    spinner.finish_and_clear();
    let pkg_id = result?;
    save_manager(&mut manager)?;

    output::success(&format!("Appended {} ({})", pkg_id, args.package_type));
    Ok(())
}

fn rm(args: PkgIdArgs) -> Result<()> {
    let mut manager = load_manager()?;
    let removed = manager.remove_package(&args.pkg_id)?;
    save_manager(&mut manager)?;

    output::success(&format!("Removed {}", removed.id()));
    if removed.state().is_configured() {
        output::info(&format!(
            "{} was {}; its data under {} was left in place",
            removed.id(),
            removed.state(),
            removed.paths().private_dir.display()
        ));
    }
    Ok(())
}

async fn configure(args: PplConfigureArgs) -> Result<()> {
    let mut manager = load_manager()?;
    let params = to_config_map(args.params);

    let spinner = output::spinner(&format!("Configuring {}...", args.pkg_id));
    let result = manager.configure_package(&args.pkg_id, &params).await;
    spinner.finish_and_clear();
    result?;
    save_manager(&mut manager)?;

    output::success(&format!("Configured {}", args.pkg_id));
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Start,
    Stop,
    Clean,
}

impl Action {
    fn verb(self) -> (&'static str, &'static str) {
        match self {
            Action::Start => ("Starting", "Started"),
            Action::Stop => ("Stopping", "Stopped"),
            Action::Clean => ("Cleaning", "Cleaned"),
        }
    }
}

async fn sweep(action: Action) -> Result<()> {
    let mut manager = load_manager()?;
    let id = current_or_err(&manager)?.id().to_string();
    let (doing, done) = action.verb();

    let spinner = output::spinner(&format!("{} pipeline {}...", doing, id));
    let result = match action {
        Action::Start => manager.start().await,
        Action::Stop => manager.stop().await,
        Action::Clean => manager.clean().await,
    };
    spinner.finish_and_clear();
    // Progress made before a failure is worth keeping
    save_manager(&mut manager)?;

    match result {
        Ok(ids) if ids.is_empty() => {
            output::info("Nothing to do");
            Ok(())
        }
        Ok(ids) => {
            output::success(&format!("{} {}", done, ids.join(", ")));
            Ok(())
        }
        Err(e) => {
            output::error(&format!("{} pipeline {} failed", doing, id));
            Err(e.into())
        }
    }
}

#[derive(Tabled)]
struct StatusRow {
    id: String,
    #[tabled(rename = "type")]
    package_type: String,
    state: String,
    health: String,
}

impl From<StatusEntry> for StatusRow {
    fn from(entry: StatusEntry) -> Self {
        let health = match entry.healthy {
            _ if !entry.resolved => console::style("missing").yellow().to_string(),
            Some(true) => console::style("healthy").green().to_string(),
            Some(false) => console::style("unhealthy").red().to_string(),
            None => console::style("-").dim().to_string(),
        };
        Self {
            id: entry.id,
            package_type: entry.package_type,
            state: entry.state.to_string(),
            health,
        }
    }
}

async fn status() -> Result<()> {
    let mut manager = load_manager()?;
    let spinner = output::spinner("Querying packages...");
    let result = manager.status().await;
    spinner.finish_and_clear();
    let entries = result?;

    if entries.is_empty() {
        output::info("The pipeline has no packages");
        return Ok(());
    }
    let unhealthy = entries.iter().filter(|e| e.healthy == Some(false)).count();
    let missing = entries.iter().filter(|e| !e.resolved).count();
    let rows: Vec<StatusRow> = entries.into_iter().map(StatusRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);

    if unhealthy > 0 {
        output::warning(&format!("{} packages are unhealthy", unhealthy));
    }
    if missing > 0 {
        output::warning(&format!(
            "{} packages have no repository providing their type; see `corral repo list`",
            missing
        ));
    }
    Ok(())
}

async fn destroy(args: PplDestroyArgs) -> Result<()> {
    let mut manager = load_manager()?;
    let spinner = output::spinner("Cleaning packages...");
    let result = manager.destroy(args.id.as_deref()).await;
    spinner.finish_and_clear();
    let report = result?;
    save_manager(&mut manager)?;

    output::success(&format!(
        "Destroyed pipeline {} ({} packages cleaned)",
        report.pipeline,
        report.cleaned.len()
    ));
    for orphan in &report.orphaned {
        output::warning(&format!(
            "{} could not be cleaned: {}",
            orphan.id, orphan.error
        ));
    }
    if !report.orphaned.is_empty() {
        output::info("See `corral ppl orphans` for data left on the hosts");
    }
    Ok(())
}

#[derive(Tabled)]
struct OrphanRow {
    pipeline: String,
    id: String,
    #[tabled(rename = "type")]
    package_type: String,
    private_dir: String,
    orphaned: String,
}

fn orphans() -> Result<()> {
    let manager = load_manager()?;
    let orphans = manager.orphans()?;
    if orphans.is_empty() {
        output::success("No orphaned packages");
        return Ok(());
    }
    let rows: Vec<OrphanRow> = orphans
        .into_iter()
        .map(|o| OrphanRow {
            pipeline: o.pipeline,
            id: o.id,
            package_type: o.package_type,
            private_dir: o.private_dir.display().to_string(),
            orphaned: o.orphaned_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}

fn current_or_err(manager: &PipelineManager) -> Result<&corral_pipeline::Pipeline> {
    manager
        .current()
        .ok_or_else(|| anyhow!("No current pipeline; run `corral ppl create <id>` first"))
}
