//! Package lifecycle states and their persisted form

use std::fmt;

use chrono::{DateTime, Utc};
use corral_core::Env;
use serde::{Deserialize, Serialize};

use crate::schema::ResolvedConfig;

/// Where a package instance is in its lifecycle
///
/// ```text
/// Unconfigured ──configure──▶ Configured ──start──▶ Running ──stop──▶ Stopped
///                                  ▲                                    │
///                                  └──────────────start─────────────────┘
/// clean: Configured | Running | Stopped | Cleaned ──▶ Cleaned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Unconfigured,
    Configured,
    Running,
    Stopped,
    Cleaned,
}

/// A lifecycle operation, for transition checks and messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Configure,
    Start,
    Stop,
    Clean,
    Status,
}

impl LifecycleState {
    pub fn is_configured(self) -> bool {
        self != LifecycleState::Unconfigured
    }

    /// Whether `action` may run from this state
    pub fn permits(self, action: LifecycleAction) -> bool {
        use LifecycleAction::*;
        use LifecycleState::*;
        match action {
            Configure => self != Running,
            Start => matches!(self, Configured | Stopped),
            Stop => self == Running,
            Clean | Status => self != Unconfigured,
        }
    }

    /// The state after `action` succeeds
    pub fn after(self, action: LifecycleAction) -> Self {
        match action {
            LifecycleAction::Configure => LifecycleState::Configured,
            LifecycleAction::Start => LifecycleState::Running,
            LifecycleAction::Stop => LifecycleState::Stopped,
            LifecycleAction::Clean => LifecycleState::Cleaned,
            LifecycleAction::Status => self,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unconfigured => "unconfigured",
            LifecycleState::Configured => "configured",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Cleaned => "cleaned",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleAction::Configure => "configure",
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Clean => "clean",
            LifecycleAction::Status => "status",
        };
        write!(f, "{}", s)
    }
}

/// A package instance as stored in pipeline.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub id: String,

    #[serde(rename = "type")]
    pub package_type: String,

    /// Repository the implementation was resolved from
    #[serde(default)]
    pub repo: String,

    #[serde(default)]
    pub state: LifecycleState,

    #[serde(default)]
    pub config: ResolvedConfig,

    #[serde(default)]
    pub env: Env,

    /// Last successful transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<DateTime<Utc>>,
}
