//! Cluster resource graph
//!
//! A snapshot of filesystem mounts and network interfaces keyed by host.
//! The graph is built by probing every host (see `corral-dispatch`) and
//! persisted to `resource_graph.yaml`; packages query it while configuring.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{load_yaml, save_yaml};
use crate::error::Result;

/// A mounted filesystem on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEntry {
    pub host: String,
    pub device: String,
    pub fs_type: String,
    pub mount: String,
    pub size_kb: u64,
    pub avail_kb: u64,
}

/// An IPv4 interface on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetEntry {
    pub host: String,
    pub interface: String,
    pub ip: String,
    pub prefix_len: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGraph {
    #[serde(default)]
    pub fs: Vec<FsEntry>,
    #[serde(default)]
    pub net: Vec<NetEntry>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let graph: Self = load_yaml(path.as_ref())?;
        debug!(
            "Loaded resource graph: {} filesystems, {} interfaces",
            graph.fs.len(),
            graph.net.len()
        );
        Ok(graph)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_yaml(path.as_ref(), self)
    }

    pub fn is_empty(&self) -> bool {
        self.fs.is_empty() && self.net.is_empty()
    }

    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self
            .fs
            .iter()
            .map(|e| e.host.as_str())
            .chain(self.net.iter().map(|e| e.host.as_str()))
            .collect();
        hosts.sort_unstable();
        hosts.dedup();
        hosts
    }

    pub fn filesystems_for<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a FsEntry> {
        self.fs.iter().filter(move |e| e.host == host)
    }

    pub fn interfaces_for<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a NetEntry> {
        self.net.iter().filter(move |e| e.host == host)
    }

    /// The mount on `host` that contains `path` (longest mount prefix wins)
    pub fn find_mount<'a>(&'a self, host: &'a str, path: &str) -> Option<&'a FsEntry> {
        self.filesystems_for(host)
            .filter(|e| path_within(path, &e.mount))
            .max_by_key(|e| e.mount.len())
    }

    /// Replace everything known about the given hosts
    pub fn replace_hosts(&mut self, hosts: &[String], fs: Vec<FsEntry>, net: Vec<NetEntry>) {
        self.fs.retain(|e| !hosts.contains(&e.host));
        self.net.retain(|e| !hosts.contains(&e.host));
        self.fs.extend(fs);
        self.net.extend(net);
    }

    /// Parse `df -PT -k` output
    pub fn parse_df(host: &str, output: &str) -> Vec<FsEntry> {
        output
            .lines()
            .skip(1)
            .filter_map(|line| {
                let cols: Vec<&str> = line.split_whitespace().collect();
                if cols.len() < 7 {
                    return None;
                }
                Some(FsEntry {
                    host: host.to_string(),
                    device: cols[0].to_string(),
                    fs_type: cols[1].to_string(),
                    size_kb: cols[2].parse().ok()?,
                    avail_kb: cols[4].parse().ok()?,
                    mount: cols[6..].join(" "),
                })
            })
            .collect()
    }

    /// Parse `ip -o -4 addr show` output
    pub fn parse_ip_addr(host: &str, output: &str) -> Vec<NetEntry> {
        output
            .lines()
            .filter_map(|line| {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                let interface = tokens.get(1)?.trim_end_matches(':');
                let inet = tokens.iter().position(|t| *t == "inet")?;
                let (ip, prefix) = tokens.get(inet + 1)?.split_once('/')?;
                Some(NetEntry {
                    host: host.to_string(),
                    interface: interface.to_string(),
                    ip: ip.to_string(),
                    prefix_len: prefix.parse().ok()?,
                })
            })
            .collect()
    }
}

fn path_within(path: &str, mount: &str) -> bool {
    if mount == "/" {
        return path.starts_with('/');
    }
    path == mount
        || path
            .strip_prefix(mount)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DF: &str = "\
Filesystem     Type  1024-blocks      Used Available Capacity Mounted on
/dev/sda1      ext4     41152736  20000000  19000000      52% /
/dev/nvme0n1   xfs     976762584   1000000 975762584       1% /mnt/nvme
";

    const IP: &str = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: eth0    inet 10.0.0.5/24 brd 10.0.0.255 scope global eth0\\       valid_lft forever
";

    #[test]
    fn test_parse_df() {
        let fs = ResourceGraph::parse_df("n1", DF);
        assert_eq!(fs.len(), 2);
        assert_eq!(fs[1].mount, "/mnt/nvme");
        assert_eq!(fs[1].fs_type, "xfs");
        assert_eq!(fs[1].avail_kb, 975762584);
    }

    #[test]
    fn test_parse_ip_addr() {
        let net = ResourceGraph::parse_ip_addr("n1", IP);
        assert_eq!(net.len(), 2);
        assert_eq!(net[1].interface, "eth0");
        assert_eq!(net[1].ip, "10.0.0.5");
        assert_eq!(net[1].prefix_len, 24);
    }

    #[test]
    fn test_find_mount_prefers_longest_prefix() {
        let graph = ResourceGraph {
            fs: ResourceGraph::parse_df("n1", DF),
            net: vec![],
        };
        assert_eq!(
            graph.find_mount("n1", "/mnt/nvme/ofs").unwrap().mount,
            "/mnt/nvme"
        );
        assert_eq!(graph.find_mount("n1", "/home/me").unwrap().mount, "/");
        assert!(graph.find_mount("n1", "/mnt/nvmeX").unwrap().mount == "/");
        assert!(graph.find_mount("n2", "/mnt/nvme").is_none());
    }

    #[test]
    fn test_replace_hosts_only_touches_probed_hosts() {
        let mut graph = ResourceGraph {
            fs: ResourceGraph::parse_df("n1", DF),
            net: ResourceGraph::parse_ip_addr("n2", IP),
        };
        graph.replace_hosts(
            &["n1".to_string()],
            vec![],
            ResourceGraph::parse_ip_addr("n1", IP),
        );
        assert!(graph.filesystems_for("n1").next().is_none());
        assert_eq!(graph.interfaces_for("n1").count(), 2);
        assert_eq!(graph.interfaces_for("n2").count(), 2);
        assert_eq!(graph.hosts(), vec!["n1", "n2"]);
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rg.yaml");
        let graph = ResourceGraph {
            fs: ResourceGraph::parse_df("n1", DF),
            net: vec![],
        };
        graph.save(&path).unwrap();
        assert_eq!(ResourceGraph::load(&path).unwrap(), graph);
    }
}
