//! Host transport trait definitions
//!
//! A transport knows how to run one command, or move files, on one host.
//! Fan-out, timeouts and failure aggregation belong to the dispatcher.

use std::path::PathBuf;

use async_trait::async_trait;
use corral_core::{Env, Result};

/// Output of a command on a single host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Build from a finished process; a signal death maps to -1
    pub fn from_process(output: std::process::Output) -> Self {
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Transport for executing primitives on a single host
#[async_trait]
pub trait HostTransport: Send + Sync {
    /// Get the transport name (e.g., "local", "ssh")
    fn name(&self) -> &'static str;

    /// Run a shell command on `host` with extra environment variables
    async fn run(&self, host: &str, command: &str, env: &Env) -> Result<CommandOutput>;

    /// Copy local paths to the same absolute paths on `host`
    async fn copy(&self, paths: &[PathBuf], host: &str) -> Result<CommandOutput>;

    /// Create directories (and parents) on `host`
    async fn mkdir(&self, paths: &[PathBuf], host: &str, env: &Env) -> Result<CommandOutput> {
        self.run(host, &format!("mkdir -p {}", quote_paths(paths)), env)
            .await
    }

    /// Remove paths on `host`; missing paths are not an error
    async fn remove(&self, paths: &[PathBuf], host: &str, env: &Env) -> Result<CommandOutput> {
        self.run(host, &format!("rm -rf {}", quote_paths(paths)), env)
            .await
    }
}

/// Quote a string for POSIX sh
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub(crate) fn quote_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| shell_quote(&p.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain() {
        assert_eq!(shell_quote("/tmp/ofs_data"), "/tmp/ofs_data");
        assert_eq!(shell_quote("tcp://n1:3334/ofs"), "tcp://n1:3334/ofs");
    }

    #[test]
    fn test_shell_quote_special() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_quote_paths() {
        let paths = vec![PathBuf::from("/a"), PathBuf::from("/b c")];
        assert_eq!(quote_paths(&paths), "/a '/b c'");
    }

    // Test that the trait is object-safe
    fn _assert_object_safe(_: &dyn HostTransport) {}
}
