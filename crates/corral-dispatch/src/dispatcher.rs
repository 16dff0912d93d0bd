//! Host-group dispatcher
//!
//! Fans one operation out to every host of a group in parallel and
//! aggregates the per-host results into a [`DispatchReport`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use corral_core::config::DEFAULT_COMMAND_TIMEOUT_SECS;
use corral_core::{Env, Error, FailureKind, HostFailure, HostGroup, Result};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::template::CommandTemplate;
use crate::transport::{CommandOutput, HostTransport};

/// Terminal status of one host in a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    Completed,
    Failed(FailureKind),
}

/// Result of one host in a dispatch
#[derive(Debug, Clone)]
pub struct PerHostResult {
    pub host: String,
    pub status: HostStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl PerHostResult {
    pub fn is_success(&self) -> bool {
        self.status == HostStatus::Completed
    }

    pub fn failure(&self) -> Option<HostFailure> {
        match &self.status {
            HostStatus::Completed => None,
            HostStatus::Failed(kind) => Some(HostFailure {
                host: self.host.clone(),
                kind: kind.clone(),
                stderr: self.stderr.trim().to_string(),
            }),
        }
    }
}

/// Aggregated results of one operation across one group
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub group: String,
    pub operation: String,
    pub results: Vec<PerHostResult>,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn failures(&self) -> Vec<HostFailure> {
        self.results.iter().filter_map(|r| r.failure()).collect()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    pub fn succeeded_hosts(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.host.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn result_for(&self, host: &str) -> Option<&PerHostResult> {
        self.results.iter().find(|r| r.host == host)
    }

    /// Turn a report with failed hosts into `Error::RemoteExecution`
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.to_error())
        }
    }

    fn to_error(&self) -> Error {
        Error::RemoteExecution {
            group: self.group.clone(),
            total: self.total(),
            failures: self.failures(),
        }
    }
}

/// One primitive to issue against a group
#[derive(Debug, Clone)]
pub enum DispatchAction {
    Run {
        command: CommandTemplate,
        env: Env,
    },
    Copy {
        paths: Vec<PathBuf>,
    },
    Mkdir {
        paths: Vec<PathBuf>,
        env: Env,
    },
    Remove {
        paths: Vec<PathBuf>,
        env: Env,
    },
}

/// A group plus the action to run on it, for ordered execution
#[derive(Debug, Clone)]
pub struct DispatchStep {
    pub group: HostGroup,
    pub action: DispatchAction,
}

impl DispatchStep {
    pub fn run(group: &HostGroup, command: impl Into<CommandTemplate>, env: &Env) -> Self {
        Self {
            group: group.clone(),
            action: DispatchAction::Run {
                command: command.into(),
                env: env.clone(),
            },
        }
    }

    pub fn copy(group: &HostGroup, paths: Vec<PathBuf>) -> Self {
        Self {
            group: group.clone(),
            action: DispatchAction::Copy { paths },
        }
    }

    pub fn mkdir(group: &HostGroup, paths: Vec<PathBuf>, env: &Env) -> Self {
        Self {
            group: group.clone(),
            action: DispatchAction::Mkdir {
                paths,
                env: env.clone(),
            },
        }
    }

    pub fn remove(group: &HostGroup, paths: Vec<PathBuf>, env: &Env) -> Self {
        Self {
            group: group.clone(),
            action: DispatchAction::Remove {
                paths,
                env: env.clone(),
            },
        }
    }
}

/// Executes primitives across host groups through a transport
#[derive(Clone)]
pub struct HostGroupDispatcher {
    transport: Arc<dyn HostTransport>,
    timeout: Duration,
}

impl HostGroupDispatcher {
    pub fn new(transport: Arc<dyn HostTransport>) -> Self {
        Self {
            transport,
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// Set the per-host timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Run a command template on every host of the group
    ///
    /// Templates are rendered for every host before anything is issued, so a
    /// template error never reaches a host. Host failures are collected in
    /// the report rather than returned as errors.
    pub async fn run(
        &self,
        command: impl Into<CommandTemplate>,
        group: &HostGroup,
        env: &Env,
    ) -> Result<DispatchReport> {
        let template = command.into();
        let commands = group
            .iter()
            .enumerate()
            .map(|(i, host)| template.render_for(host, &group.role, i))
            .collect::<Result<Vec<_>>>()?;

        info!("Running on {} ({} hosts): {}", group.role, group.len(), template.source());
        let transport = self.transport.clone();
        let report = self
            .fan_out(group, "run", move |index, host| {
                let transport = transport.clone();
                let command = commands[index].clone();
                let env = env.clone();
                async move { transport.run(&host, &command, &env).await }
            })
            .await;
        Ok(report)
    }

    /// Copy local paths to the same location on every host of the group
    pub async fn copy(&self, paths: &[PathBuf], group: &HostGroup) -> DispatchReport {
        info!("Copying {} path(s) to {} ({} hosts)", paths.len(), group.role, group.len());
        let transport = self.transport.clone();
        self.fan_out(group, "copy", move |_, host| {
            let transport = transport.clone();
            let paths = paths.to_vec();
            async move { transport.copy(&paths, &host).await }
        })
        .await
    }

    /// Create directories on every host of the group
    pub async fn mkdir(&self, paths: &[PathBuf], group: &HostGroup, env: &Env) -> DispatchReport {
        debug!("mkdir {:?} on {}", paths, group.role);
        let transport = self.transport.clone();
        self.fan_out(group, "mkdir", move |_, host| {
            let transport = transport.clone();
            let paths = paths.to_vec();
            let env = env.clone();
            async move { transport.mkdir(&paths, &host, &env).await }
        })
        .await
    }

    /// Remove paths on every host of the group (missing paths are fine)
    pub async fn remove(&self, paths: &[PathBuf], group: &HostGroup, env: &Env) -> DispatchReport {
        debug!("rm {:?} on {}", paths, group.role);
        let transport = self.transport.clone();
        self.fan_out(group, "remove", move |_, host| {
            let transport = transport.clone();
            let paths = paths.to_vec();
            let env = env.clone();
            async move { transport.remove(&paths, &host, &env).await }
        })
        .await
    }

    /// Execute one step and return its report
    pub async fn execute(&self, step: &DispatchStep) -> Result<DispatchReport> {
        match &step.action {
            DispatchAction::Run { command, env } => self.run(command.clone(), &step.group, env).await,
            DispatchAction::Copy { paths } => Ok(self.copy(paths, &step.group).await),
            DispatchAction::Mkdir { paths, env } => Ok(self.mkdir(paths, &step.group, env).await),
            DispatchAction::Remove { paths, env } => {
                Ok(self.remove(paths, &step.group, env).await)
            }
        }
    }

    /// Execute steps in order, stopping at the first group with a failed host
    ///
    /// Every host of the failing group has finished before the error is
    /// returned; later steps are never issued and earlier ones are not
    /// rolled back.
    pub async fn run_ordered(&self, steps: &[DispatchStep]) -> Result<Vec<DispatchReport>> {
        let mut reports = Vec::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            let report = self.execute(step).await?;
            if !report.is_success() {
                warn!(
                    "{} on group '{}' failed on {}/{} hosts; skipping {} remaining step(s)",
                    report.operation,
                    report.group,
                    report.failed_count(),
                    report.total(),
                    steps.len() - i - 1
                );
                return Err(report.to_error());
            }
            reports.push(report);
        }
        Ok(reports)
    }

    async fn fan_out<F, Fut>(&self, group: &HostGroup, operation: &str, op: F) -> DispatchReport
    where
        F: Fn(usize, String) -> Fut,
        Fut: Future<Output = Result<CommandOutput>>,
    {
        if group.is_empty() {
            warn!("Dispatching {} to empty group '{}'", operation, group.role);
        }

        let timeout = self.timeout;
        let futures = group.hosts.iter().enumerate().map(|(index, host)| {
            let fut = op(index, host.clone());
            let host = host.clone();
            async move {
                let start = Instant::now();
                let (status, stdout, stderr) = match tokio::time::timeout(timeout, fut).await {
                    Ok(Ok(out)) if out.is_success() => (HostStatus::Completed, out.stdout, out.stderr),
                    Ok(Ok(out)) => (
                        HostStatus::Failed(FailureKind::ExitStatus(out.exit_code)),
                        out.stdout,
                        out.stderr,
                    ),
                    Ok(Err(e)) => (
                        HostStatus::Failed(FailureKind::Transport(e.to_string())),
                        String::new(),
                        String::new(),
                    ),
                    Err(_) => (
                        HostStatus::Failed(FailureKind::Timeout),
                        String::new(),
                        format!("timed out after {:?}", timeout),
                    ),
                };
                if let HostStatus::Failed(kind) = &status {
                    warn!("[{}] {}", host, kind);
                }
                PerHostResult {
                    host,
                    status,
                    stdout,
                    stderr,
                    duration: start.elapsed(),
                }
            }
        });

        let results = join_all(futures).await;
        let report = DispatchReport {
            group: group.role.clone(),
            operation: operation.to_string(),
            results,
        };
        debug!(
            "{} on '{}': {}/{} hosts succeeded",
            operation,
            group.role,
            report.total() - report.failed_count(),
            report.total()
        );
        report
    }
}
