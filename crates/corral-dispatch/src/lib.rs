//! Host-group dispatch for corral
//!
//! This crate fans commands and file transfers out to the hosts of a
//! [`HostGroup`](corral_core::HostGroup):
//!
//! - Hosts within one group run concurrently; each host is bounded by the
//!   dispatcher timeout and a timed-out host counts as a failure.
//! - A failing host never cancels its siblings. Every host's result is
//!   collected before the group is judged.
//! - Groups passed to [`HostGroupDispatcher::run_ordered`] run one after
//!   another, and the first failing group stops the sequence.
//!
//! # Architecture
//!
//! ```text
//! HostGroupDispatcher
//! └── HostTransport (trait)
//!     ├── LocalTransport   (sh -c on this machine)
//!     └── SshTransport     (ssh/scp, localhost short-circuits to local)
//! ```

pub mod dispatcher;
pub mod introspect;
pub mod local;
pub mod ssh;
pub mod template;
pub mod transport;

pub use dispatcher::{
    DispatchAction, DispatchReport, DispatchStep, HostGroupDispatcher, HostStatus, PerHostResult,
};
pub use introspect::ResourceGraphBuilder;
pub use local::LocalTransport;
pub use ssh::{SshOptions, SshTransport};
pub use template::CommandTemplate;
pub use transport::{shell_quote, CommandOutput, HostTransport};

use std::sync::Arc;

/// The default transport: ssh for remote hosts, in-process for localhost
pub fn default_transport() -> Arc<dyn HostTransport> {
    Arc::new(SshTransport::new(SshOptions::default()))
}
