//! Type definitions shared across corral crates

mod host;
mod repository;

use std::collections::BTreeMap;

pub use host::{HostGroup, Hostfile, LOCALHOST};
pub use repository::Repository;

/// Environment variables forwarded to dispatched commands
pub type Env = BTreeMap<String, String>;
