//! Repository commands

use anyhow::Result;
use corral_packages::AddOutcome;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::{AvailableArgs, RepoAddArgs, RepoCommands, RepoListArgs, RepoNameArgs};
use crate::commands::{load_manager, save_manager};
use crate::output;

pub async fn run(cmd: RepoCommands) -> Result<()> {
    match cmd {
        RepoCommands::Add(args) => add(args),
        RepoCommands::Promote(args) => promote(args),
        RepoCommands::Remove(args) => remove(args),
        RepoCommands::List(args) => list(args),
        RepoCommands::Available(args) => available(args),
    }
}

fn add(args: RepoAddArgs) -> Result<()> {
    let mut manager = load_manager()?;
    let outcome = manager.add_repo(&args.path, args.force)?;
    save_manager(&mut manager)?;

    match outcome {
        AddOutcome::Added => output::success(&format!("Added {}", args.path.display())),
        AddOutcome::Updated => output::success(&format!("Updated {}", args.path.display())),
        AddOutcome::Unchanged => output::warning(&format!(
            "{} is already registered; use --force to repoint it",
            args.path.display()
        )),
    }
    Ok(())
}

fn promote(args: RepoNameArgs) -> Result<()> {
    let mut manager = load_manager()?;
    manager.promote_repo(&args.name)?;
    save_manager(&mut manager)?;
    output::success(&format!("{} now has the highest priority", args.name));
    Ok(())
}

fn remove(args: RepoNameArgs) -> Result<()> {
    let mut manager = load_manager()?;
    let repo = manager.remove_repo(&args.name)?;
    save_manager(&mut manager)?;
    output::success(&format!("Removed {}", repo.name));
    output::info(&format!("Files under {} were not deleted", repo.path.display()));
    Ok(())
}

#[derive(Tabled)]
struct RepoRow {
    #[tabled(rename = "#")]
    priority: usize,
    name: String,
    path: String,
    packages: String,
}

fn list(args: RepoListArgs) -> Result<()> {
    let manager = load_manager()?;

    if let Some(name) = args.name {
        let listing = manager.list_repo(&name)?;
        if !listing.exists {
            output::warning(&format!(
                "{} no longer exists at {}",
                name,
                listing.repo.path.display()
            ));
            return Ok(());
        }
        output::header(&format!("{} ({})", name, listing.repo.path.display()));
        for package_type in listing.package_types {
            println!("  {}", package_type);
        }
        return Ok(());
    }

    let rows: Vec<RepoRow> = manager
        .list_repos()?
        .into_iter()
        .enumerate()
        .map(|(i, listing)| RepoRow {
            priority: i,
            name: listing.repo.name.clone(),
            path: listing.repo.path.display().to_string(),
            packages: if listing.exists {
                listing.package_types.len().to_string()
            } else {
                "missing".to_string()
            },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "type")]
    package_type: String,
    repo: String,
    kind: String,
}

#[derive(Serialize)]
struct PackageJson {
    package_type: String,
    repo: String,
    kind: String,
    dir: String,
}

fn available(args: AvailableArgs) -> Result<()> {
    let manager = load_manager()?;
    let packages = manager.available_packages()?;

    if packages.is_empty() {
        output::warning("No package types found");
        return Ok(());
    }

    if args.json {
        let json: Vec<PackageJson> = packages
            .into_iter()
            .map(|d| PackageJson {
                package_type: d.package_type,
                repo: d.repo,
                kind: d.kind.to_string(),
                dir: d.dir.display().to_string(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        let rows: Vec<PackageRow> = packages
            .into_iter()
            .map(|d| PackageRow {
                package_type: d.package_type,
                repo: d.repo,
                kind: d.kind.to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{}", table);
    }
    Ok(())
}
