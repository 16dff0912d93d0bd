//! Error types for corral-core

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using corral-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single host failed during a dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FailureKind {
    /// The command ran and exited non-zero
    ExitStatus(i32),
    /// The command did not finish before the dispatch timeout
    Timeout,
    /// The transport could not run the command at all
    Transport(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ExitStatus(code) => write!(f, "exit status {}", code),
            FailureKind::Timeout => write!(f, "timed out"),
            FailureKind::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

/// A failed host within a dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFailure {
    pub host: String,
    pub kind: FailureKind,
    /// Captured stderr, trimmed
    #[serde(default)]
    pub stderr: String,
}

impl HostFailure {
    pub fn exit_status(&self) -> Option<i32> {
        match self.kind {
            FailureKind::ExitStatus(code) => Some(code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

fn describe_failures(failures: &[HostFailure]) -> String {
    failures
        .iter()
        .map(|f| {
            if f.stderr.is_empty() {
                format!("  {}: {}", f.host, f.kind)
            } else {
                format!("  {}: {} ({})", f.host, f.kind, f.stderr)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Core error types for corral
#[derive(Error, Debug)]
pub enum Error {
    /// A supplied option value failed type or choice validation
    #[error("Invalid value for option '{option}': {message}")]
    Validation { option: String, message: String },

    /// A required option had neither a user value nor a default
    #[error("Missing required option: {option}")]
    MissingRequiredOption { option: String },

    /// No repository yields the requested package type
    #[error("Package not found in any repository: {package_type}")]
    PackageNotFound { package_type: String },

    /// A repository directory does not follow the repo/<name>/<pkg> layout
    #[error("Invalid repository layout at {path}: {message}")]
    InvalidRepositoryLayout { path: String, message: String },

    /// Unknown repository name
    #[error("Could not find repo: {name}")]
    RepositoryNotFound { name: String },

    /// A lifecycle call that targets hosts was made before configure
    #[error("Package '{package}' is not configured")]
    NotConfigured { package: String },

    /// A lifecycle call that is not valid from the current state
    #[error("Cannot {action} package '{package}' while it is {state}")]
    InvalidTransition {
        package: String,
        action: String,
        state: String,
    },

    /// One or more hosts in a group failed
    #[error(
        "Remote execution failed on {}/{total} hosts in group '{group}':\n{}",
        .failures.len(),
        describe_failures(.failures)
    )]
    RemoteExecution {
        group: String,
        total: usize,
        failures: Vec<HostFailure>,
    },

    /// An external resource a package depends on is absent
    #[error("Missing resource: {message}")]
    MissingResource { message: String },

    /// Unknown pipeline
    #[error("Pipeline not found: {id}")]
    PipelineNotFound { id: String },

    /// No pipeline is selected
    #[error("No pipeline is selected. Create one or cd into an existing pipeline")]
    NoCurrentPipeline,

    /// Unknown package id within a pipeline
    #[error("Package '{id}' not found in pipeline '{pipeline}'")]
    PackageIdNotFound { pipeline: String, id: String },

    /// Package id already present within a pipeline
    #[error("Package '{id}' already exists in pipeline '{pipeline}'")]
    DuplicatePackageId { pipeline: String, id: String },

    /// Configuration file not found
    #[error("No configuration was found at {path}. Run corral init first")]
    ConfigNotFound { path: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {message}")]
    InvalidConfig { message: String },

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            option: option.into(),
            message: message.into(),
        }
    }

    /// Create a missing required option error
    pub fn missing_required(option: impl Into<String>) -> Self {
        Self::MissingRequiredOption {
            option: option.into(),
        }
    }

    /// Create a package not found error
    pub fn package_not_found(package_type: impl Into<String>) -> Self {
        Self::PackageNotFound {
            package_type: package_type.into(),
        }
    }

    /// Create an invalid repository layout error
    pub fn invalid_layout(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::InvalidRepositoryLayout {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Create a repository not found error
    pub fn repository_not_found(name: impl Into<String>) -> Self {
        Self::RepositoryNotFound { name: name.into() }
    }

    /// Create a not configured error
    pub fn not_configured(package: impl Into<String>) -> Self {
        Self::NotConfigured {
            package: package.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(
        package: impl Into<String>,
        action: impl Into<String>,
        state: impl fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            package: package.into(),
            action: action.into(),
            state: state.to_string(),
        }
    }

    /// Create a missing resource error
    pub fn missing_resource(message: impl Into<String>) -> Self {
        Self::MissingResource {
            message: message.into(),
        }
    }

    /// Create a config not found error
    pub fn config_not_found(path: impl fmt::Display) -> Self {
        Self::ConfigNotFound {
            path: path.to_string(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// True for errors raised before anything was dispatched to a host
    pub fn is_local(&self) -> bool {
        !matches!(self, Error::RemoteExecution { .. })
    }
}
