use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context as _;

use crate::config::Config;
use crate::history::ExecutionHistory;
use crate::notify::{self, Notifier};
use crate::queue::MissionQueue;
use crate::signals::{Signals, epoch_secs};

/// Inbox directory name inside the state directory.
pub const INBOX_DIR: &str = "inbox";

/// Everything one process needs, resolved once at startup.
///
/// Passed explicitly to every operation; nothing in the crate keeps global
/// state.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    pub config: Config,
    pub state_dir: PathBuf,
    pub queue_path: PathBuf,
    /// When this process started, for marker staleness checks.
    pub started_at: SystemTime,
    /// Same instant as epoch seconds, for timestamped signals.
    pub started_epoch: i64,
}

impl Context {
    /// Resolve the project root (default: current dir) and load its config.
    pub fn load(project_root: Option<&Path>) -> anyhow::Result<Self> {
        let root = match project_root {
            Some(p) => p.to_path_buf(),
            None => std::env::current_dir().context("determining project root")?,
        };
        let config = Config::load_for_root(&root)?;
        Ok(Self::new(root, config))
    }

    pub fn new(root: PathBuf, config: Config) -> Self {
        let state_dir = root.join(&config.paths.state_dir);
        let queue_path = root.join(&config.paths.queue_file);
        Self {
            root,
            config,
            state_dir,
            queue_path,
            started_at: SystemTime::now(),
            started_epoch: epoch_secs(),
        }
    }

    pub fn queue(&self) -> MissionQueue {
        MissionQueue::new(&self.queue_path)
    }

    pub fn history(&self) -> ExecutionHistory {
        ExecutionHistory::in_dir(&self.state_dir)
    }

    pub fn signals(&self) -> Signals {
        Signals::new(&self.state_dir)
    }

    pub fn inbox_dir(&self) -> PathBuf {
        self.state_dir.join(INBOX_DIR)
    }

    pub fn notifier(&self) -> Box<dyn Notifier> {
        notify::from_config(&self.config.notify)
    }
}
