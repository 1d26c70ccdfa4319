//! Cluster configuration loading and management.
//!
//! Every protocol timing constant lives here rather than in control flow,
//! so tests and deployments can tune the windows independently.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use hivemind_proto::RoleDefinition;

/// Main cluster configuration, loaded from hivemind.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// How long to collect discovery replies
    #[serde(default = "default_discovery_window_ms")]
    pub discovery_window_ms: u64,

    /// Pause after deployment before discovery, so fresh listeners can start
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Per-attempt wait for a role acknowledgement
    #[serde(default = "default_assign_attempt_timeout_ms")]
    pub assign_attempt_timeout_ms: u64,

    /// Assignment attempts per role before giving up
    #[serde(default = "default_assign_retry_budget")]
    pub assign_retry_budget: u32,

    /// Call deadline when the caller does not supply one
    #[serde(default = "default_task_deadline_ms")]
    pub task_default_deadline_ms: u64,

    /// Poll granularity of the shared receive loop
    #[serde(default = "default_recv_poll_ms")]
    pub recv_poll_ms: u64,

    /// Install path for the bootstrap payload on worker nodes
    #[serde(default = "default_bootstrap_path")]
    pub bootstrap_path: String,

    /// Optional JSONL event log location
    #[serde(default)]
    pub events_path: Option<PathBuf>,

    /// Configured roles, in offer order (role i goes to discovered node i)
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}

fn default_discovery_window_ms() -> u64 {
    20_000
}
fn default_settle_delay_ms() -> u64 {
    8_000
}
fn default_assign_attempt_timeout_ms() -> u64 {
    5_000
}
fn default_assign_retry_budget() -> u32 {
    6
}
fn default_task_deadline_ms() -> u64 {
    10_000
}
fn default_recv_poll_ms() -> u64 {
    250
}
fn default_bootstrap_path() -> String {
    "startup".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            discovery_window_ms: default_discovery_window_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            assign_attempt_timeout_ms: default_assign_attempt_timeout_ms(),
            assign_retry_budget: default_assign_retry_budget(),
            task_default_deadline_ms: default_task_deadline_ms(),
            recv_poll_ms: default_recv_poll_ms(),
            bootstrap_path: default_bootstrap_path(),
            events_path: None,
            roles: Vec::new(),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Load from a project root (looks for hivemind.yaml)
    pub fn load_from_project(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join("hivemind.yaml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn assign_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.assign_attempt_timeout_ms)
    }

    pub fn task_default_deadline(&self) -> Duration {
        Duration::from_millis(self.task_default_deadline_ms)
    }

    pub fn recv_poll(&self) -> Duration {
        Duration::from_millis(self.recv_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_design_values() {
        let config = ClusterConfig::default();
        assert_eq!(config.discovery_window(), Duration::from_secs(20));
        assert_eq!(config.settle_delay(), Duration::from_secs(8));
        assert_eq!(config.assign_attempt_timeout(), Duration::from_secs(5));
        assert_eq!(config.assign_retry_budget, 6);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: ClusterConfig = serde_yaml::from_str(
            "discovery_window_ms: 500\nroles:\n  - name: memory\n    description: chat memory\n",
        )
        .unwrap();
        assert_eq!(config.discovery_window(), Duration::from_millis(500));
        assert_eq!(config.assign_retry_budget, 6);
        assert_eq!(config.roles.len(), 1);
        assert_eq!(config.roles[0].name.as_str(), "memory");
    }
}
