//! Resource graph introspection
//!
//! Probes mounts and network interfaces on every host of a group and
//! folds the answers into a [`ResourceGraph`].

use corral_core::{Env, HostGroup, ResourceGraph, Result};
use tracing::info;

use crate::dispatcher::{DispatchReport, HostGroupDispatcher};

const DF_COMMAND: &str = "df -PT -k";
const IP_COMMAND: &str = "ip -o -4 addr show";

pub struct ResourceGraphBuilder<'a> {
    dispatcher: &'a HostGroupDispatcher,
}

impl<'a> ResourceGraphBuilder<'a> {
    pub fn new(dispatcher: &'a HostGroupDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Build a fresh graph from every host in the group
    pub async fn build(&self, group: &HostGroup) -> Result<ResourceGraph> {
        let mut graph = ResourceGraph::new();
        self.modify(&mut graph, group).await?;
        Ok(graph)
    }

    /// Re-probe the group's hosts, replacing what the graph knew about them
    pub async fn modify(&self, graph: &mut ResourceGraph, group: &HostGroup) -> Result<()> {
        let env = Env::new();
        let df = self
            .dispatcher
            .run(DF_COMMAND, group, &env)
            .await?
            .into_result()?;
        let ip = self
            .dispatcher
            .run(IP_COMMAND, group, &env)
            .await?
            .into_result()?;

        let fs = collect(&df, ResourceGraph::parse_df);
        let net = collect(&ip, ResourceGraph::parse_ip_addr);
        info!(
            "Introspected {} hosts: {} filesystems, {} interfaces",
            group.len(),
            fs.len(),
            net.len()
        );
        graph.replace_hosts(&group.hosts, fs, net);
        Ok(())
    }
}

fn collect<T>(report: &DispatchReport, parse: fn(&str, &str) -> Vec<T>) -> Vec<T> {
    report
        .results
        .iter()
        .flat_map(|r| parse(&r.host, &r.stdout))
        .collect()
}
