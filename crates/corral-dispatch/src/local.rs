//! Local process transport

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use corral_core::{Env, Result};
use tokio::process::Command;
use tracing::debug;

use crate::transport::{CommandOutput, HostTransport};

/// Runs everything on this machine, ignoring the host name
#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(&self, host: &str, command: &str, env: &Env) -> Result<CommandOutput> {
        debug!("[{}] {}", host, command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput::from_process(output))
    }

    async fn copy(&self, paths: &[PathBuf], _host: &str) -> Result<CommandOutput> {
        // Source and destination are the same file on this machine
        let missing: Vec<String> = paths
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if missing.is_empty() {
            Ok(CommandOutput::success(""))
        } else {
            Ok(CommandOutput::failure(
                1,
                format!("No such file or directory: {}", missing.join(", ")),
            ))
        }
    }

    async fn mkdir(&self, paths: &[PathBuf], _host: &str, _env: &Env) -> Result<CommandOutput> {
        for path in paths {
            if let Err(e) = tokio::fs::create_dir_all(path).await {
                return Ok(CommandOutput::failure(
                    1,
                    format!("mkdir {}: {}", path.display(), e),
                ));
            }
        }
        Ok(CommandOutput::success(""))
    }

    async fn remove(&self, paths: &[PathBuf], _host: &str, _env: &Env) -> Result<CommandOutput> {
        for path in paths {
            let result = match tokio::fs::symlink_metadata(path).await {
                Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
                Ok(_) => tokio::fs::remove_file(path).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Ok(CommandOutput::failure(
                        1,
                        format!("rm {}: {}", path.display(), e),
                    ))
                }
            }
        }
        Ok(CommandOutput::success(""))
    }
}
