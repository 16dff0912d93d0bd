//! Common test utilities for corral-dispatch
//!
//! Provides a scriptable transport that records every invocation so tests
//! can assert on side effects per host without spawning processes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use corral_core::{Env, Result};
use corral_dispatch::{CommandOutput, HostTransport};

/// Record of a transport call
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub host: String,
    pub operation: String,
    pub detail: String,
}

/// Scripted transport for tests
#[derive(Default)]
pub struct MockTransport {
    /// Responses keyed by host; unknown hosts succeed with empty output
    responses: Mutex<HashMap<String, CommandOutput>>,
    /// Responses keyed by (host, command substring)
    command_responses: Mutex<Vec<(String, String, CommandOutput)>>,
    delays: Mutex<HashMap<String, Duration>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_host(&self, host: &str, exit_code: i32, stderr: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(host.to_string(), CommandOutput::failure(exit_code, stderr));
    }

    pub fn respond(&self, host: &str, command_contains: &str, output: CommandOutput) {
        self.command_responses.lock().unwrap().push((
            host.to_string(),
            command_contains.to_string(),
            output,
        ));
    }

    pub fn delay_host(&self, host: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(host.to_string(), delay);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocations_for(&self, host: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| i.host == host)
            .collect()
    }

    async fn respond_to(&self, host: &str, operation: &str, detail: String) -> CommandOutput {
        let delay = self.delays.lock().unwrap().get(host).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.invocations.lock().unwrap().push(Invocation {
            host: host.to_string(),
            operation: operation.to_string(),
            detail: detail.clone(),
        });

        let scripted = self
            .command_responses
            .lock()
            .unwrap()
            .iter()
            .find(|(h, needle, _)| h == host && detail.contains(needle.as_str()))
            .map(|(_, _, out)| out.clone());
        if let Some(out) = scripted {
            return out;
        }

        self.responses
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_else(|| CommandOutput::success(""))
    }
}

fn join(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl HostTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, host: &str, command: &str, _env: &Env) -> Result<CommandOutput> {
        Ok(self.respond_to(host, "run", command.to_string()).await)
    }

    async fn copy(&self, paths: &[PathBuf], host: &str) -> Result<CommandOutput> {
        Ok(self.respond_to(host, "copy", join(paths)).await)
    }

    async fn mkdir(&self, paths: &[PathBuf], host: &str, _env: &Env) -> Result<CommandOutput> {
        Ok(self.respond_to(host, "mkdir", join(paths)).await)
    }

    async fn remove(&self, paths: &[PathBuf], host: &str, _env: &Env) -> Result<CommandOutput> {
        Ok(self.respond_to(host, "remove", join(paths)).await)
    }
}

pub fn group(role: &str, hosts: &[&str]) -> corral_core::HostGroup {
    corral_core::HostGroup::new(role, hosts.iter().map(|h| h.to_string()).collect())
}
