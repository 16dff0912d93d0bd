//! Mock implementations for testing without side effects

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use corral_core::{Env, HostGroup, Result};
use corral_dispatch::{CommandOutput, HostTransport};
use corral_packages::{
    ConfigurationOption, ConfigurationSchema, OptionType, Package, PackageContext, ResolvedConfig,
};

/// One recorded transport call
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub host: String,
    pub operation: String,
    pub detail: String,
}

/// Transport that records calls and replies from a script
///
/// Replies are matched on (host, substring of the command or path list);
/// anything unmatched succeeds with empty output.
#[derive(Default)]
pub struct MockTransport {
    failures: Mutex<Vec<(String, String, CommandOutput)>>,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every call on `host` whose detail contains `needle` fail
    pub fn fail_on(&self, host: &str, needle: &str, exit_code: i32) {
        self.failures.lock().unwrap().push((
            host.to_string(),
            needle.to_string(),
            CommandOutput::failure(exit_code, format!("{} failed", needle)),
        ));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.invocations.lock().unwrap().clear();
    }

    /// Calls whose detail contains `needle`, in issue order
    pub fn matching(&self, needle: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| i.detail.contains(needle))
            .collect()
    }

    pub fn for_host(&self, host: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| i.host == host)
            .collect()
    }

    fn record(&self, host: &str, operation: &str, detail: String) -> CommandOutput {
        let reply = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(h, needle, _)| h == host && detail.contains(needle.as_str()))
            .map(|(_, _, out)| out.clone())
            .unwrap_or_else(|| CommandOutput::success(""));
        self.invocations.lock().unwrap().push(Invocation {
            host: host.to_string(),
            operation: operation.to_string(),
            detail,
        });
        reply
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
        Ok(self.record(host, "run", command.to_string()))
    }

    async fn copy(&self, paths: &[PathBuf], host: &str) -> Result<CommandOutput> {
        Ok(self.record(host, "copy", join(paths)))
    }

    async fn mkdir(&self, paths: &[PathBuf], host: &str, _env: &Env) -> Result<CommandOutput> {
        Ok(self.record(host, "mkdir", join(paths)))
    }

    async fn remove(&self, paths: &[PathBuf], host: &str, _env: &Env) -> Result<CommandOutput> {
        Ok(self.record(host, "remove", join(paths)))
    }
}

/// A package that logs each lifecycle call and runs one command per call
///
/// Roles: `server` (every host). Menu: `port` (int, default 3334),
/// `protocol` (tcp|ib, default tcp).
#[derive(Default)]
pub struct RecordingPackage {
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingPackage {
    pub fn new() -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
        let package = Self::default();
        let calls = package.calls.clone();
        (Box::new(package), calls)
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl Package for RecordingPackage {
    fn class_name(&self) -> &str {
        "Recording"
    }

    fn configure_menu(&self) -> ConfigurationSchema {
        ConfigurationSchema::new(Vec::new())
            .option(ConfigurationOption::new("port", OptionType::Int).with_default(3334))
            .option(
                ConfigurationOption::new("protocol", OptionType::Str)
                    .with_default("tcp")
                    .with_choices(["tcp", "ib"]),
            )
    }

    fn host_groups(&self, config: &ResolvedConfig) -> Result<Vec<HostGroup>> {
        let hosts = match config.get("server_host_set") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };
        Ok(vec![HostGroup::new("server", hosts)])
    }

    async fn configure(&self, ctx: &mut PackageContext<'_>) -> Result<()> {
        self.log("configure");
        let hosts = ctx.hostfile().hosts().to_vec();
        ctx.config.set("server_host_set", &hosts)?;
        let port = ctx.config.get_i64("port").unwrap_or_default();
        ctx.env.insert("RECORDING_PORT".to_string(), port.to_string());
        let group = HostGroup::new("server", hosts);
        ctx.run(format!("recording-setup --port {}", port), &group)
            .await?;
        Ok(())
    }

    async fn start(&self, ctx: &PackageContext<'_>) -> Result<()> {
        self.log("start");
        ctx.run("recording-start", ctx.group("server")?).await?;
        Ok(())
    }

    async fn stop(&self, ctx: &PackageContext<'_>) -> Result<()> {
        self.log("stop");
        ctx.run("recording-stop", ctx.group("server")?).await?;
        Ok(())
    }

    async fn clean(&self, ctx: &PackageContext<'_>) -> Result<()> {
        self.log("clean");
        ctx.remove(&[PathBuf::from("/tmp/recording")], ctx.group("server")?)
            .await?;
        Ok(())
    }

    async fn status(&self, ctx: &PackageContext<'_>) -> Result<bool> {
        self.log("status");
        let report = ctx
            .dispatcher()
            .run("recording-status", ctx.group("server")?, &ctx.env)
            .await?;
        Ok(report.is_success())
    }
}
