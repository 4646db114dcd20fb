//! Per-mission execution counters used to break retry loops.
//!
//! Keys are normalized mission text, so the same mission queued with a
//! different project tag or list marker shares one counter. A missing or
//! unreadable history file counts as empty: losing counters only weakens loop
//! detection, it never touches the queue.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::queue::mission::{strip_list_marker, strip_project_tags};
use crate::store::atomic_write;

/// History file name inside the state directory.
pub const HISTORY_FILE: &str = ".mission-history.json";

/// Default threshold for [`ExecutionHistory::should_skip`].
pub const DEFAULT_MAX_EXECUTIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Epoch seconds.
    #[serde(default)]
    pub last_run: f64,
    #[serde(default)]
    pub last_exit_code: i32,
}

pub type HistoryMap = BTreeMap<String, HistoryEntry>;

/// Canonical history key for a mission.
///
/// First line only, list markers and `[project:..]` tags removed, trimmed.
/// Applied until nothing changes, so it is idempotent.
pub fn normalize_key(text: &str) -> String {
    let mut current = text.lines().next().unwrap_or("").trim().to_string();
    loop {
        let next = strip_project_tags(strip_list_marker(&current))
            .trim()
            .to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Current time as epoch seconds.
pub fn epoch_now() -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let millis = chrono::Utc::now().timestamp_millis() as f64;
    millis / 1000.0
}

/// Drop stale entries, then cap the rest to the most recently run.
///
/// Returns how many entries were removed. Kept entries are not modified.
pub fn prune(map: &mut HistoryMap, now: f64, max_age_hours: f64, max_entries: usize) -> usize {
    let before = map.len();
    let cutoff = max_age_hours.mul_add(-3600.0, now);
    map.retain(|_, entry| entry.last_run >= cutoff);

    if map.len() > max_entries {
        let mut by_recency: Vec<(String, f64)> = map
            .iter()
            .map(|(k, e)| (k.clone(), e.last_run))
            .collect();
        by_recency.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (key, _) in by_recency.into_iter().skip(max_entries) {
            map.remove(&key);
        }
    }
    before - map.len()
}

/// JSON-backed execution history in one state directory.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    path: PathBuf,
}

impl ExecutionHistory {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(HISTORY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries; missing or corrupt files read as empty.
    pub fn load(&self) -> HistoryMap {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "unreadable history, starting empty");
                }
                return HistoryMap::new();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "corrupt history, starting empty");
            HistoryMap::new()
        })
    }

    fn save(&self, map: &HistoryMap) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(map)?;
        atomic_write(&self.path, &json)?;
        Ok(())
    }

    /// Count one more execution of `text`. Returns the new count.
    pub fn record_execution(
        &self,
        text: &str,
        project: Option<&str>,
        exit_code: i32,
    ) -> anyhow::Result<u32> {
        self.record_execution_at(text, project, exit_code, epoch_now())
    }

    fn record_execution_at(
        &self,
        text: &str,
        project: Option<&str>,
        exit_code: i32,
        now: f64,
    ) -> anyhow::Result<u32> {
        let key = normalize_key(text);
        let mut map = self.load();
        let entry = map.entry(key.clone()).or_insert_with(|| HistoryEntry {
            count: 0,
            project: None,
            last_run: now,
            last_exit_code: 0,
        });
        entry.count += 1;
        entry.last_run = now;
        entry.last_exit_code = exit_code;
        if let Some(p) = project.filter(|p| !p.is_empty()) {
            entry.project = Some(p.to_string());
        }
        let count = entry.count;
        self.save(&map)?;
        tracing::debug!(key = %key, count, exit_code, "execution recorded");
        Ok(count)
    }

    pub fn get_execution_count(&self, text: &str) -> u32 {
        self.load()
            .get(&normalize_key(text))
            .map_or(0, |e| e.count)
    }

    /// True once `text` has run `max_executions` times or more.
    pub fn should_skip(&self, text: &str, max_executions: u32) -> bool {
        self.get_execution_count(text) >= max_executions
    }

    /// Prune by age and size. Returns how many entries were dropped.
    pub fn cleanup_old_entries(&self, max_age_hours: f64, max_entries: usize) -> anyhow::Result<usize> {
        let mut map = self.load();
        let removed = prune(&mut map, epoch_now(), max_age_hours, max_entries);
        if removed > 0 {
            self.save(&map)?;
            tracing::info!(removed, kept = map.len(), "history cleaned up");
        }
        Ok(removed)
    }
}
