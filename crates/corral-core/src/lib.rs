//! # corral-core
//!
//! Core library for corral providing:
//! - The error taxonomy shared by every corral crate
//! - Hostfiles and host groups (the targets of every dispatch)
//! - Repository records for package discovery
//! - The persisted configuration store (corral.yaml, repos.yaml)
//! - The resource graph snapshot handed to packages during configure

pub mod config;
pub mod error;
pub mod resource_graph;
pub mod types;
pub mod utils;

pub use config::{ConfigStore, CorralConfig};
pub use error::{Error, FailureKind, HostFailure, Result};
pub use resource_graph::ResourceGraph;
pub use types::{Env, HostGroup, Hostfile, Repository};
pub use utils::{expand_path, get_home_dir, to_camel_case};
