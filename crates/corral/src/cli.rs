//! CLI argument parsing with clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

/// corral - deploy and manage package pipelines across a cluster
#[derive(Parser, Debug)]
#[command(name = "corral")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the corral store
    Init(InitArgs),

    /// Initialize the corral store from a machine preset
    Bootstrap(BootstrapArgs),

    /// Show the persisted configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Package repositories
    #[command(subcommand)]
    Repo(RepoCommands),

    /// Cluster hostfile
    #[command(subcommand)]
    Hostfile(HostfileCommands),

    /// Resource graph of the cluster
    #[command(subcommand)]
    Rg(RgCommands),

    /// Pipelines and their packages
    #[command(subcommand)]
    Ppl(PplCommands),

    /// Delete the shared directory and every host's private directory
    Reset(ResetArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where pipeline metadata is stored
    pub config_dir: String,

    /// Per-host directory for package data
    pub private_dir: String,

    /// Directory with the same contents on every host
    pub shared_dir: Option<String>,

    /// Per-host timeout for dispatched commands, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct BootstrapArgs {
    /// Machine preset to copy, or `local` for a layout under the corral home
    #[arg(required_unless_present = "list")]
    pub machine: Option<String>,

    /// List the available machine presets
    #[arg(long, conflicts_with = "machine")]
    pub list: bool,
}

// Config commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print corral.yaml
    Show,

    /// Print where corral.yaml is stored
    Path,
}

// Repository commands
#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Add a repository at the highest priority
    Add(RepoAddArgs),

    /// Move a repository to the highest priority
    Promote(RepoNameArgs),

    /// Remove a repository from the search list (files are kept)
    Remove(RepoNameArgs),

    /// List repositories, or the package types of one
    List(RepoListArgs),

    /// List every package type that resolves
    Available(AvailableArgs),
}

#[derive(Args, Debug)]
pub struct RepoAddArgs {
    /// Repository directory; its name is the directory's base name
    pub path: PathBuf,

    /// Repoint an existing repository of the same name
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct RepoNameArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct RepoListArgs {
    /// Repository to list package types for
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct AvailableArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// Hostfile commands
#[derive(Subcommand, Debug)]
pub enum HostfileCommands {
    /// Use a hostfile; an empty path selects localhost
    Set(HostfileSetArgs),

    /// Print the hosts in use
    Show,
}

#[derive(Args, Debug)]
pub struct HostfileSetArgs {
    pub path: Option<String>,
}

// Resource graph commands
#[derive(Subcommand, Debug)]
pub enum RgCommands {
    /// Probe every host and replace the resource graph
    Build,

    /// Re-probe every host, keeping facts about other hosts
    Modify,

    /// Print the resource graph
    Show(RgShowArgs),
}

#[derive(Args, Debug)]
pub struct RgShowArgs {
    /// Output as YAML
    #[arg(long)]
    pub yaml: bool,
}

// Pipeline commands
#[derive(Subcommand, Debug)]
pub enum PplCommands {
    /// Create a pipeline (or reopen it) and focus on it
    Create(PplIdArgs),

    /// Focus on an existing pipeline
    Cd(PplIdArgs),

    /// List pipelines
    List,

    /// Show the packages of the current pipeline
    Show(PplShowArgs),

    /// Configure a package and append it to the current pipeline
    Append(PplAppendArgs),

    /// Remove a package from the current pipeline without cleaning it
    Rm(PkgIdArgs),

    /// Reconfigure a package of the current pipeline
    Configure(PplConfigureArgs),

    /// Start every package in pipeline order
    Start,

    /// Stop every package in reverse order
    Stop,

    /// Clean every package in reverse order
    Clean,

    /// Query the health of every package
    Status,

    /// Clean every package and delete the pipeline
    Destroy(PplDestroyArgs),

    /// List packages a destroy could not clean
    Orphans,
}

#[derive(Args, Debug)]
pub struct PplIdArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct PkgIdArgs {
    /// Package id within the pipeline
    pub pkg_id: String,
}

#[derive(Args, Debug)]
pub struct PplShowArgs {
    /// Print each package's resolved configuration
    #[arg(long)]
    pub config: bool,
}

#[derive(Args, Debug)]
pub struct PplAppendArgs {
    /// Package type to construct
    pub package_type: String,

    /// Package id (defaults to the package type)
    #[arg(long)]
    pub id: Option<String>,

    /// Configuration parameters as key=value
    #[arg(value_parser = parse_param)]
    pub params: Vec<(String, Value)>,
}

#[derive(Args, Debug)]
pub struct PplConfigureArgs {
    /// Package id within the pipeline
    pub pkg_id: String,

    /// Configuration parameters as key=value
    #[arg(value_parser = parse_param)]
    pub params: Vec<(String, Value)>,
}

#[derive(Args, Debug)]
pub struct PplDestroyArgs {
    /// Pipeline to destroy (defaults to the current one)
    pub id: Option<String>,
}

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Skip the safety check
    #[arg(short, long)]
    pub force: bool,
}

/// Parse `key=value`, reading the value as YAML so `port=8080` is an integer
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }
    let value = if value.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml_ng::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };
    Ok((key.to_string(), value))
}
