//! Pipelines and the corral manager
//!
//! A [`Pipeline`] is an ordered list of configured package instances,
//! persisted as `<config_dir>/<id>/pipeline.yaml`. The [`PipelineManager`]
//! is the context object every command runs against: it owns the stored
//! configuration, the repository registry, the resource graph, the hostfile
//! and the currently selected pipeline.
//!
//! # Construction order
//!
//! ```text
//! load:  corral.yaml -> repos.yaml -> resource_graph.yaml -> hostfile
//! save:  pipeline -> resource_graph.yaml -> repos.yaml -> corral.yaml
//! ```

pub mod manager;
pub mod pipeline;

pub use manager::{
    DestroyReport, OrphanRecord, PipelineManager, StatusEntry, LOCAL_MACHINE, ORPHANS_FILE,
};
pub use pipeline::{Pipeline, PIPELINE_FILE};
