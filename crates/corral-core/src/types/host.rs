//! Hostfiles and host groups
//!
//! A hostfile lists one host per line. Blank lines and `#` comments are
//! ignored, and bracket ranges expand into several hosts:
//!
//! ```text
//! # storage nodes
//! ares-comp-[01-04]
//! ares-meta-[1,3]
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Host name that transports execute in-process instead of over ssh
pub const LOCALHOST: &str = "localhost";

/// Most hosts a single host line may expand to
pub const MAX_EXPANDED_HOSTS: u64 = 65_536;

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)$").expect("range regex is valid"));

/// A named, ordered set of hosts targeted by one dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    pub role: String,
    pub hosts: Vec<String>,
}

impl HostGroup {
    pub fn new(role: impl Into<String>, hosts: Vec<String>) -> Self {
        Self {
            role: role.into(),
            hosts,
        }
    }

    /// A group containing only the controlling host
    pub fn local(role: impl Into<String>) -> Self {
        Self::new(role, vec![LOCALHOST.to_string()])
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(|h| h.as_str())
    }

    pub fn first(&self) -> Option<&str> {
        self.hosts.first().map(|h| h.as_str())
    }

    /// Join the hosts with a separator (e.g. `,` for command-line lists)
    pub fn host_str(&self, sep: &str) -> String {
        self.hosts.join(sep)
    }

    /// A single-host group with the same role
    pub fn single(&self, host: &str) -> Self {
        Self::new(self.role.clone(), vec![host.to_string()])
    }
}

/// The cluster's global host list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostfile {
    path: Option<PathBuf>,
    hosts: Vec<String>,
}

impl Default for Hostfile {
    fn default() -> Self {
        Self::localhost()
    }
}

impl Hostfile {
    /// The hostfile used when none is configured: just this machine
    pub fn localhost() -> Self {
        Self {
            path: None,
            hosts: vec![LOCALHOST.to_string()],
        }
    }

    /// Build an in-memory hostfile from explicit hosts
    pub fn from_hosts(hosts: Vec<String>) -> Self {
        Self { path: None, hosts }
    }

    /// Read and expand a hostfile from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let hosts = Self::parse(&content)?;
        debug!("Loaded {} hosts from {:?}", hosts.len(), path);
        Ok(Self {
            path: Some(path.to_path_buf()),
            hosts,
        })
    }

    /// Parse hostfile text into an expanded host list
    pub fn parse(content: &str) -> Result<Vec<String>> {
        let mut hosts = Vec::new();
        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            hosts.extend(expand_line(line)?);
        }
        Ok(hosts)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// True when the hostfile only targets this machine
    pub fn is_local(&self) -> bool {
        self.hosts.iter().all(|h| h == LOCALHOST)
    }

    /// The first `count` hosts
    pub fn subset(&self, count: usize) -> Self {
        Self {
            path: None,
            hosts: self.hosts.iter().take(count).cloned().collect(),
        }
    }

    pub fn host_str(&self, sep: &str) -> String {
        self.hosts.join(sep)
    }

    /// View the whole hostfile as a role group
    pub fn group(&self, role: impl Into<String>) -> HostGroup {
        HostGroup::new(role, self.hosts.clone())
    }

    /// Write the expanded host list, one per line
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = self.hosts.join("\n");
        content.push('\n');
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Expand every bracket group in a host line, left to right
fn expand_line(line: &str) -> Result<Vec<String>> {
    let Some(open) = line.find('[') else {
        return Ok(vec![line.to_string()]);
    };
    let close = line[open..]
        .find(']')
        .map(|i| open + i)
        .ok_or_else(|| Error::invalid_config(format!("Unclosed '[' in host line: {}", line)))?;

    let prefix = &line[..open];
    let values = expand_ranges(&line[open + 1..close], line)?;
    let suffixes = expand_line(&line[close + 1..])?;

    let total = values.len() as u64 * suffixes.len() as u64;
    if total > MAX_EXPANDED_HOSTS {
        return Err(too_many(line));
    }
    let mut hosts = Vec::with_capacity(total as usize);
    for value in &values {
        for suffix in &suffixes {
            hosts.push(format!("{}{}{}", prefix, value, suffix));
        }
    }
    Ok(hosts)
}

/// Expand `01-03,7` into `["01", "02", "03", "7"]`, keeping zero padding
fn expand_ranges(spec: &str, line: &str) -> Result<Vec<String>> {
    let mut values = Vec::new();
    for part in spec.split(',').map(str::trim) {
        if let Some(caps) = RANGE_RE.captures(part) {
            let start_str = &caps[1];
            let end_str = &caps[2];
            let width = if start_str.starts_with('0') {
                start_str.len()
            } else {
                0
            };
            let start: u64 = start_str.parse().map_err(|_| bad_range(line))?;
            let end: u64 = end_str.parse().map_err(|_| bad_range(line))?;
            if end < start {
                return Err(bad_range(line));
            }
            if (end - start + 1).saturating_add(values.len() as u64) > MAX_EXPANDED_HOSTS {
                return Err(too_many(line));
            }
            values.extend((start..=end).map(|n| format!("{:0width$}", n, width = width)));
        } else if !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()) {
            values.push(part.to_string());
        } else {
            return Err(bad_range(line));
        }
    }
    Ok(values)
}

fn bad_range(line: &str) -> Error {
    Error::invalid_config(format!("Invalid host range in line: {}", line))
}

fn too_many(line: &str) -> Error {
    Error::invalid_config(format!(
        "Host line expands to more than {} hosts: {}",
        MAX_EXPANDED_HOSTS, line
    ))
}
