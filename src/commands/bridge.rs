use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context as _;

use super::queue::render_line;
use super::send::MESSAGE_EXT;
use super::signal::pause_deadline;
use super::status::{StatusReport, format_age};
use crate::context::Context;
use crate::error::ExitError;
use crate::notify::Notifier;
use crate::queue::Section;
use crate::queue::mission::display_text;
use crate::signals::epoch_secs;
use crate::store::BoundedDedupSet;

const HELP: &str = "Commands:
/queue - list pending missions
/urgent <text> - add a mission on top
/cancel <n|keyword> - remove a pending mission
/priority <n> [target] - move mission n (to the top by default)
/pause [minutes] [reason] - pause the loop
/resume - lift a pause
/focus <project> - only run that project's missions
/unfocus - run everything again
/verbose, /quiet - toggle per-mission notifications
/status - queue and loop summary
/restart - restart loop and bridge
/stop - shut everything down
Anything else is queued as a new mission.";

// ---------------------------------------------------------------------------
// Message routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stop,
    Restart,
    Pause {
        minutes: Option<u64>,
        reason: String,
    },
    Resume,
    Focus(String),
    Unfocus,
    Verbose,
    Quiet,
    Queue,
    Cancel(String),
    Priority {
        position: usize,
        target: usize,
    },
    Urgent(String),
    Status,
    Help,
    /// Plain text: queued at the bottom of Pending.
    Mission(String),
    /// A recognized command used wrongly; holds the usage hint.
    Invalid(String),
}

/// Parse a message body into the command it asks for.
///
/// Commands are case-insensitive and must be followed by whitespace or the
/// end of the message (`/stopwatch` is a mission, not `/stop`).
pub fn route_message(body: &str) -> Command {
    let trimmed = body.trim();
    if !trimmed.starts_with('/') {
        return Command::Mission(trimmed.to_string());
    }

    for prefix in ["/stop", "/shutdown"] {
        if strip_prefix_ci(trimmed, prefix).is_some() {
            return Command::Stop;
        }
    }
    let bare = [
        ("/restart", Command::Restart),
        ("/resume", Command::Resume),
        ("/unfocus", Command::Unfocus),
        ("/verbose", Command::Verbose),
        ("/quiet", Command::Quiet),
        ("/queue", Command::Queue),
        ("/status", Command::Status),
        ("/help", Command::Help),
    ];
    for (prefix, command) in bare {
        if strip_prefix_ci(trimmed, prefix).is_some() {
            return command;
        }
    }

    // /pause [minutes] [reason]
    if let Some(rest) = strip_prefix_ci(trimmed, "/pause") {
        let (first, tail) = split_word(&rest);
        return match first.parse::<u64>() {
            Ok(minutes) => Command::Pause {
                minutes: Some(minutes),
                reason: tail.to_string(),
            },
            Err(_) => Command::Pause {
                minutes: None,
                reason: rest,
            },
        };
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "/focus") {
        return if rest.is_empty() {
            Command::Invalid("usage: /focus <project>".into())
        } else {
            Command::Focus(split_word(&rest).0.to_string())
        };
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "/cancel") {
        return if rest.is_empty() {
            Command::Invalid("usage: /cancel <n|keyword>".into())
        } else {
            Command::Cancel(rest)
        };
    }

    // /priority <pos> [target]
    if let Some(rest) = strip_prefix_ci(trimmed, "/priority") {
        let usage = || Command::Invalid("usage: /priority <n> [target]".into());
        let (first, tail) = split_word(&rest);
        let Ok(position) = first.parse::<usize>() else {
            return usage();
        };
        let target = if tail.is_empty() {
            1
        } else {
            match split_word(tail).0.parse::<usize>() {
                Ok(t) => t,
                Err(_) => return usage(),
            }
        };
        return Command::Priority { position, target };
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "/urgent") {
        return if rest.is_empty() {
            Command::Invalid("usage: /urgent <text>".into())
        } else {
            Command::Urgent(rest)
        };
    }

    Command::Mission(trimmed.to_string())
}

/// Strip a case-insensitive word prefix; the rest comes back trimmed.
///
/// The prefix must be followed by whitespace or the end of the input.
fn strip_prefix_ci(input: &str, prefix: &str) -> Option<String> {
    let head = input.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let rest = &input[prefix.len()..];
    if rest.is_empty() {
        return Some(String::new());
    }
    if rest.starts_with(char::is_whitespace) {
        return Some(rest.trim().to_string());
    }
    None
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    }
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// One message file picked up from the inbox.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub path: PathBuf,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    Running,
    Shutdown,
    Restart,
}

/// The messaging front end: turns inbox messages into queue edits and
/// signals, and reports back through a [`Notifier`].
pub struct Bridge<'a> {
    ctx: &'a Context,
    notifier: Box<dyn Notifier>,
    seen: BoundedDedupSet<String>,
    stale_reported: bool,
}

impl<'a> Bridge<'a> {
    pub fn new(ctx: &'a Context, notifier: Box<dyn Notifier>) -> anyhow::Result<Self> {
        let seen = BoundedDedupSet::new(ctx.config.bridge.dedup_capacity)
            .map_err(|e| ExitError::Config(format!("bridge.dedup_capacity: {e}")))?;
        Ok(Self {
            ctx,
            notifier,
            seen,
            stale_reported: false,
        })
    }

    /// Message files in the inbox, oldest id first.
    pub fn poll_inbox(&self) -> anyhow::Result<Vec<InboundMessage>> {
        let inbox = self.ctx.inbox_dir();
        let entries = match std::fs::read_dir(&inbox) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("reading {}", inbox.display())));
            }
        };

        let mut messages = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MESSAGE_EXT) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(body) => messages.push(InboundMessage { id, path, body }),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable message"),
            }
        }
        messages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(messages)
    }

    /// Handle one message at most once. Returns the reply, or None for a
    /// message id that was already processed.
    pub fn process(&mut self, message: &InboundMessage) -> Option<String> {
        let fresh = self.seen.add(message.id.clone());
        let reply = if fresh {
            let command = route_message(&message.body);
            tracing::info!(id = %message.id, ?command, "bridge message");
            let reply = self.handle(&command);
            self.notifier.send(&reply);
            Some(reply)
        } else {
            tracing::debug!(id = %message.id, "duplicate message ignored");
            None
        };
        if let Err(e) = std::fs::remove_file(&message.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %message.path.display(), error = %e, "could not remove message");
        }
        reply
    }

    /// Apply a command and describe the result. Failures become the reply.
    pub fn handle(&self, command: &Command) -> String {
        self.apply(command).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "bridge command failed");
            format!("Error: {e:#}")
        })
    }

    fn apply(&self, command: &Command) -> anyhow::Result<String> {
        let queue = self.ctx.queue();
        let signals = self.ctx.signals();
        let reply = match command {
            Command::Stop => {
                signals.request_shutdown()?;
                "Shutting down".to_string()
            }
            Command::Restart => {
                signals.request_restart("bridge command")?;
                "Restarting".to_string()
            }
            Command::Pause { minutes, reason } => {
                let until = pause_deadline(epoch_secs(), *minutes);
                signals.request_pause(reason, until)?;
                match minutes {
                    Some(m) if until.is_some() => format!("Paused for {m} minute(s)"),
                    _ => "Paused until /resume".to_string(),
                }
            }
            Command::Resume => {
                signals.resume()?;
                "Resumed".to_string()
            }
            Command::Focus(project) => {
                signals.set_focus(project)?;
                format!("Focused on {project}")
            }
            Command::Unfocus => {
                signals.clear_focus()?;
                "Focus cleared".to_string()
            }
            Command::Verbose => {
                signals.set_verbose(true)?;
                "Verbose on".to_string()
            }
            Command::Quiet => {
                signals.set_verbose(false)?;
                "Verbose off".to_string()
            }
            Command::Queue => self.queue_listing()?,
            Command::Cancel(identifier) => format!("Cancelled: {}", queue.cancel(identifier)?),
            Command::Priority { position, target } => {
                format!("Moved to #{target}: {}", queue.reorder(*position, *target)?)
            }
            Command::Urgent(text) => {
                let line = queue.insert_pending(text, true)?;
                format!("Queued on top: {}", display_text(&line))
            }
            Command::Status => StatusReport::collect(self.ctx)?.render_pretty(),
            Command::Help => HELP.to_string(),
            Command::Mission(text) => {
                let line = queue.insert_pending(text, false)?;
                let position = queue.list_pending()?.len();
                format!("Queued #{position}: {}", display_text(&line))
            }
            Command::Invalid(usage) => usage.clone(),
        };
        Ok(reply)
    }

    fn queue_listing(&self) -> anyhow::Result<String> {
        let doc = self.ctx.queue().load()?;
        let running = doc.missions(Section::InProgress);
        let pending = doc.missions(Section::Pending);
        if running.is_empty() && pending.is_empty() {
            return Ok("Queue is empty".to_string());
        }
        let mut lines = Vec::new();
        for line in running {
            lines.push(format!("Running: {}", render_line(line)));
        }
        for (i, line) in pending.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, render_line(line)));
        }
        Ok(lines.join("\n"))
    }

    /// Report the loop as stalled once, and once more when it comes back.
    pub fn check_heartbeat(&mut self) {
        let Some(age) = self.ctx.signals().heartbeat_age() else {
            return;
        };
        let limit = i64::try_from(self.ctx.config.bridge.heartbeat_stale_secs).unwrap_or(i64::MAX);
        let stale = age > limit;
        if stale && !self.stale_reported {
            tracing::warn!(age, "agent loop heartbeat is stale");
            self.notifier.send(&format!(
                "Agent loop looks stalled: no heartbeat for {}",
                format_age(age)
            ));
            self.stale_reported = true;
        } else if !stale && self.stale_reported {
            tracing::info!(age, "agent loop heartbeat recovered");
            self.notifier.send("Agent loop is back");
            self.stale_reported = false;
        }
    }

    /// One poll: lifecycle signals first, then every pending message.
    pub fn run_once(&mut self) -> anyhow::Result<BridgeStatus> {
        let signals = self.ctx.signals();
        if signals.is_shutdown_requested(self.ctx.started_epoch) {
            return Ok(BridgeStatus::Shutdown);
        }
        if signals.restart_requested(Some(self.ctx.started_at)) {
            return Ok(BridgeStatus::Restart);
        }
        for message in self.poll_inbox()? {
            self.process(&message);
        }
        self.check_heartbeat();
        Ok(BridgeStatus::Running)
    }
}

/// Replace this process with a fresh copy of itself. Only returns on failure.
#[cfg(unix)]
fn exec_replace() -> anyhow::Error {
    use std::os::unix::process::CommandExt;

    let exe = match std::env::current_exe().context("locating current executable") {
        Ok(exe) => exe,
        Err(e) => return e,
    };
    let err = std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .exec();
    anyhow::Error::new(err).context("exec-replacing bridge")
}

/// Entry point for `missionbox run bridge`.
pub fn run_bridge(ctx: &Context) -> anyhow::Result<()> {
    let stop = super::install_interrupt_flag();
    let mut bridge = Bridge::new(ctx, ctx.notifier())?;
    let poll = Duration::from_secs(ctx.config.bridge.poll_interval.max(1));
    eprintln!("Bridge started: inbox {}", ctx.inbox_dir().display());

    while !stop.load(Ordering::SeqCst) {
        match bridge.run_once()? {
            BridgeStatus::Running => super::sleep_unless(&stop, poll),
            BridgeStatus::Shutdown => {
                eprintln!("Shutdown requested, exiting");
                break;
            }
            BridgeStatus::Restart => {
                eprintln!("Restart requested, re-executing");
                #[cfg(unix)]
                {
                    let err = exec_replace();
                    tracing::error!(error = %format!("{err:#}"), "exec failed, exiting for supervisor");
                }
                return Err(ExitError::Restart.into());
            }
        }
    }
    Ok(())
}
