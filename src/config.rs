use std::path::{Path, PathBuf};

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;

/// Config file name constants.
pub const CONFIG_TOML: &str = ".missionbox.toml";
pub const CONFIG_JSON: &str = ".missionbox.json";

/// Find the config file path, preferring .missionbox.toml over .missionbox.json.
/// Returns None if neither exists.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    let toml_path = dir.join(CONFIG_TOML);
    if toml_path.exists() {
        return Some(toml_path);
    }
    let json_path = dir.join(CONFIG_JSON);
    if json_path.exists() {
        return Some(json_path);
    }
    None
}

/// Top-level .missionbox.toml config.
///
/// Every section is optional; a project without a config file runs on the
/// defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Where the shared files live, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PathsConfig {
    /// Coordination root: signals, history and the bridge inbox.
    #[serde(default = "default_state_dir", alias = "stateDir")]
    pub state_dir: PathBuf,
    /// Mission queue document.
    #[serde(default = "default_queue_file", alias = "queueFile")]
    pub queue_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            queue_file: default_queue_file(),
        }
    }
}

/// Work-executing loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentConfig {
    /// Command run once per mission. The mission text is appended as the
    /// last argument and exported as MISSIONBOX_MISSION.
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    /// Per-mission timeout in seconds.
    #[serde(default = "default_timeout_900")]
    pub timeout: u64,
    /// Seconds to sleep between iterations when idle or paused.
    #[serde(default = "default_poll_30", alias = "pollInterval")]
    pub poll_interval: u64,
    /// Stop after this many iterations (unbounded when absent).
    #[serde(default, alias = "maxLoops")]
    pub max_loops: Option<u32>,
    /// Skip a mission once it has run this many times.
    #[serde(default = "default_max_executions", alias = "maxExecutions")]
    pub max_executions: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout: default_timeout_900(),
            poll_interval: default_poll_30(),
            max_loops: None,
            max_executions: default_max_executions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HistoryConfig {
    #[serde(default = "default_max_age_hours", alias = "maxAgeHours")]
    pub max_age_hours: f64,
    #[serde(default = "default_max_entries", alias = "maxEntries")]
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            max_entries: default_max_entries(),
        }
    }
}

/// Messaging front-end settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeConfig {
    #[serde(default = "default_poll_3", alias = "pollInterval")]
    pub poll_interval: u64,
    /// How many processed message ids to remember.
    #[serde(default = "default_dedup_capacity", alias = "dedupCapacity")]
    pub dedup_capacity: usize,
    /// Report the loop as stalled after this many seconds without a heartbeat.
    #[serde(default = "default_heartbeat_stale", alias = "heartbeatStaleSecs")]
    pub heartbeat_stale_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_3(),
            dedup_capacity: default_dedup_capacity(),
            heartbeat_stale_secs: default_heartbeat_stale(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueConfig {
    /// Done missions kept in the queue document.
    #[serde(default = "default_done_keep", alias = "doneKeep")]
    pub done_keep: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            done_keep: default_done_keep(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotifyConfig {
    /// Endpoint receiving `{"text": ...}` POSTs. Log-only when absent.
    #[serde(default, alias = "webhookUrl")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: default_notify_timeout(),
        }
    }
}

// Default value functions for serde
fn default_state_dir() -> PathBuf { PathBuf::from(".missionbox") }
fn default_queue_file() -> PathBuf { PathBuf::from("missions.md") }
fn default_command() -> Vec<String> { vec!["claude".into(), "-p".into()] }
fn default_timeout_900() -> u64 { 900 }
fn default_poll_30() -> u64 { 30 }
fn default_poll_3() -> u64 { 3 }
fn default_max_executions() -> u32 { crate::history::DEFAULT_MAX_EXECUTIONS }
fn default_max_age_hours() -> f64 { 72.0 }
fn default_max_entries() -> usize { 500 }
fn default_dedup_capacity() -> usize { 1000 }
fn default_heartbeat_stale() -> u64 { 1800 }
fn default_done_keep() -> usize { 100 }
fn default_notify_timeout() -> u64 { 10 }

impl Config {
    /// Load config from a file: JSON for a `.json` extension, TOML otherwise.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        if path.extension().is_some_and(|e| e == "json") {
            Self::parse_json(&contents)
        } else {
            Self::parse_toml(&contents)
        }
    }

    /// Config for a project root: its config file, or defaults when none exists.
    pub fn load_for_root(root: &Path) -> anyhow::Result<Self> {
        match find_config(root) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => {
                tracing::debug!(root = %root.display(), "no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse config from a TOML string.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_TOML}: {e}")).into())
    }

    /// Parse config from a JSON string.
    pub fn parse_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_JSON}: {e}")).into())
    }
}
