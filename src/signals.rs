//! Sentinel-file control signals shared by the loop and the bridge.
//!
//! Marker signals (restart, pause, focus, verbose) are "on" while their file
//! exists; readers may ignore markers older than their own start. Shutdown is
//! timestamped: it only applies to processes started at or before the
//! request, and a stale request deletes itself so it can never fire later.
//!
//! Writers always go through [`atomic_write`]; clearing a signal that is not
//! set is a success.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::store::atomic_write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Restart,
    Shutdown,
    Pause,
    Heartbeat,
    Focus,
    Verbose,
}

impl Signal {
    pub const ALL: [Self; 6] = [
        Self::Restart,
        Self::Shutdown,
        Self::Pause,
        Self::Heartbeat,
        Self::Focus,
        Self::Verbose,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Shutdown => "shutdown",
            Self::Pause => "pause",
            Self::Heartbeat => "heartbeat",
            Self::Focus => "focus",
            Self::Verbose => "verbose",
        }
    }

    pub fn file_name(self) -> String {
        format!(".missionbox-{}", self.name())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Pause marker contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseState {
    pub reason: String,
    /// Epoch seconds at which the pause lifts by itself.
    pub until: Option<i64>,
}

pub fn epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Signal files under one coordination root.
#[derive(Debug, Clone)]
pub struct Signals {
    root: PathBuf,
}

impl Signals {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, signal: Signal) -> PathBuf {
        self.root.join(signal.file_name())
    }

    pub fn is_set(&self, signal: Signal) -> bool {
        self.path(signal).is_file()
    }

    pub fn read(&self, signal: Signal) -> Option<String> {
        std::fs::read_to_string(self.path(signal)).ok()
    }

    /// Marker check: set, and (when `since` is given) modified strictly after it.
    pub fn check(&self, signal: Signal, since: Option<SystemTime>) -> bool {
        let Ok(meta) = std::fs::metadata(self.path(signal)) else {
            return false;
        };
        match since {
            None => true,
            Some(since) => meta.modified().is_ok_and(|mtime| mtime > since),
        }
    }

    pub fn raise(&self, signal: Signal, content: &str) -> io::Result<()> {
        atomic_write(&self.path(signal), content)?;
        tracing::debug!(signal = signal.name(), "signal raised");
        Ok(())
    }

    pub fn clear(&self, signal: Signal) -> io::Result<()> {
        match std::fs::remove_file(self.path(signal)) {
            Ok(()) => {
                tracing::debug!(signal = signal.name(), "signal cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    // --- restart ---

    pub fn request_restart(&self, reason: &str) -> io::Result<()> {
        self.raise(Signal::Restart, &format!("restart requested: {reason}\n"))
    }

    /// Restart marker newer than `since` (the caller's own start).
    pub fn restart_requested(&self, since: Option<SystemTime>) -> bool {
        self.check(Signal::Restart, since)
    }

    pub fn clear_restart(&self) -> io::Result<()> {
        self.clear(Signal::Restart)
    }

    // --- shutdown ---

    pub fn request_shutdown(&self) -> io::Result<i64> {
        let now = epoch_secs();
        self.request_shutdown_at(now)?;
        Ok(now)
    }

    pub fn request_shutdown_at(&self, requested_at: i64) -> io::Result<()> {
        self.raise(Signal::Shutdown, &format!("{requested_at}\n"))
    }

    /// True iff a shutdown was requested at or after `process_start`.
    ///
    /// An older request is stale: it is removed and ignored.
    pub fn is_shutdown_requested(&self, process_start: i64) -> bool {
        let Some(content) = self.read(Signal::Shutdown) else {
            return false;
        };
        match content.trim().parse::<i64>() {
            Ok(requested_at) if requested_at >= process_start => true,
            parsed => {
                tracing::info!(
                    requested_at = ?parsed.as_ref().ok(),
                    process_start,
                    "discarding stale shutdown request"
                );
                if let Err(e) = self.clear(Signal::Shutdown) {
                    tracing::warn!(error = %e, "could not remove stale shutdown file");
                }
                false
            }
        }
    }

    pub fn clear_shutdown(&self) -> io::Result<()> {
        self.clear(Signal::Shutdown)
    }

    // --- pause ---

    pub fn request_pause(&self, reason: &str, until: Option<i64>) -> io::Result<()> {
        let first = until.map_or_else(|| "-".to_string(), |t| t.to_string());
        self.raise(Signal::Pause, &format!("{first}\n{}\n", reason.trim()))
    }

    /// Current pause, if any. An expired timed pause is lifted here.
    pub fn pause_state(&self) -> Option<PauseState> {
        self.pause_state_at(epoch_secs())
    }

    fn pause_state_at(&self, now: i64) -> Option<PauseState> {
        let content = self.read(Signal::Pause)?;
        let state = parse_pause(&content);
        if let Some(until) = state.until
            && until <= now
        {
            tracing::info!(until, "timed pause expired, resuming");
            if let Err(e) = self.clear(Signal::Pause) {
                tracing::warn!(error = %e, "could not remove expired pause file");
            }
            return None;
        }
        Some(state)
    }

    pub fn resume(&self) -> io::Result<()> {
        self.clear(Signal::Pause)
    }

    // --- heartbeat ---

    pub fn beat(&self) -> io::Result<()> {
        self.raise(Signal::Heartbeat, &format!("{}\n", epoch_secs()))
    }

    /// Seconds since the last heartbeat, None if there never was one.
    pub fn heartbeat_age(&self) -> Option<i64> {
        self.heartbeat_age_at(epoch_secs())
    }

    fn heartbeat_age_at(&self, now: i64) -> Option<i64> {
        let stamp = self
            .read(Signal::Heartbeat)?
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| self.mtime_epoch(Signal::Heartbeat))?;
        Some((now - stamp).max(0))
    }

    fn mtime_epoch(&self, signal: Signal) -> Option<i64> {
        let mtime = std::fs::metadata(self.path(signal)).ok()?.modified().ok()?;
        let secs = mtime.duration_since(SystemTime::UNIX_EPOCH).ok()?.as_secs();
        i64::try_from(secs).ok()
    }

    // --- focus ---

    pub fn set_focus(&self, project: &str) -> io::Result<()> {
        self.raise(Signal::Focus, &format!("{}\n", project.trim()))
    }

    /// Project the loop is focused on, if any.
    pub fn focus(&self) -> Option<String> {
        self.read(Signal::Focus)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn clear_focus(&self) -> io::Result<()> {
        self.clear(Signal::Focus)
    }

    // --- verbose ---

    pub fn set_verbose(&self, on: bool) -> io::Result<()> {
        if on {
            self.raise(Signal::Verbose, "verbose\n")
        } else {
            self.clear(Signal::Verbose)
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.is_set(Signal::Verbose)
    }
}

fn parse_pause(content: &str) -> PauseState {
    let mut lines = content.lines();
    let first = lines.next().unwrap_or("").trim();
    match first.parse::<i64>() {
        Ok(until) => PauseState {
            reason: lines.collect::<Vec<_>>().join("\n").trim().to_string(),
            until: Some(until),
        },
        Err(_) if first == "-" => PauseState {
            reason: lines.collect::<Vec<_>>().join("\n").trim().to_string(),
            until: None,
        },
        Err(_) => PauseState {
            reason: content.trim().to_string(),
            until: None,
        },
    }
}
