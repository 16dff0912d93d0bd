//! SSH transport
//!
//! Remote hosts are reached with the system `ssh` and `scp` binaries in
//! batch mode, so key-based authentication must already be set up.
//! `localhost` is executed through [`LocalTransport`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use corral_core::types::LOCALHOST;
use corral_core::{Env, Error, Result};
use tokio::process::Command;
use tracing::debug;

use crate::local::LocalTransport;
use crate::transport::{shell_quote, CommandOutput, HostTransport};

/// Connection options shared by every ssh/scp invocation
#[derive(Debug, Clone, Default)]
pub struct SshOptions {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    options: SshOptions,
    local: LocalTransport,
}

impl SshTransport {
    pub fn new(options: SshOptions) -> Self {
        Self {
            options,
            local: LocalTransport::new(),
        }
    }

    /// Check that the ssh client tools are installed
    pub fn check_prerequisites() -> Result<()> {
        for tool in ["ssh", "scp"] {
            if which::which(tool).is_err() {
                return Err(Error::missing_resource(format!(
                    "'{}' is required for remote hosts but was not found in PATH",
                    tool
                )));
            }
        }
        Ok(())
    }

    fn destination(&self, host: &str) -> String {
        match &self.options.user {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        }
    }

    fn common_args(&self, port_flag: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
        ];
        if let Some(port) = self.options.port {
            args.push(port_flag.to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.options.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    /// Wrap a command so the remote shell sees the forwarded environment
    fn remote_command(command: &str, env: &Env) -> String {
        let exports: Vec<String> = env
            .iter()
            .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
            .collect();
        if exports.is_empty() {
            format!("sh -c {}", shell_quote(command))
        } else {
            format!("env {} sh -c {}", exports.join(" "), shell_quote(command))
        }
    }

    async fn spawn(program: &str, args: Vec<String>) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput::from_process(output))
    }
}

#[async_trait]
impl HostTransport for SshTransport {
    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn run(&self, host: &str, command: &str, env: &Env) -> Result<CommandOutput> {
        if host == LOCALHOST {
            return self.local.run(host, command, env).await;
        }
        debug!("[{}] {}", host, command);
        let mut args = self.common_args("-p");
        args.push(self.destination(host));
        args.push(Self::remote_command(command, env));
        Self::spawn("ssh", args).await
    }

    async fn copy(&self, paths: &[PathBuf], host: &str) -> Result<CommandOutput> {
        if host == LOCALHOST {
            return self.local.copy(paths, host).await;
        }
        for path in paths {
            let parent = path.parent().unwrap_or_else(|| Path::new("/"));
            let prepared = self
                .run(
                    host,
                    &format!("mkdir -p {}", shell_quote(&parent.to_string_lossy())),
                    &Env::new(),
                )
                .await?;
            if !prepared.is_success() {
                return Ok(prepared);
            }

            let mut args = self.common_args("-P");
            args.push("-q".to_string());
            args.push("-r".to_string());
            args.push(path.display().to_string());
            args.push(format!("{}:{}", self.destination(host), parent.display()));
            debug!("[{}] scp {}", host, path.display());
            let out = Self::spawn("scp", args).await?;
            if !out.is_success() {
                return Ok(out);
            }
        }
        Ok(CommandOutput::success(""))
    }
}
