use std::fmt::Write as _;

use chrono::{TimeZone, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};

use super::OutputFormat;
use crate::context::Context;
use crate::queue::Section;
use crate::queue::mission::display_text;
use crate::signals::Signal;

/// Pending missions listed by name in a report.
const PENDING_PREVIEW: usize = 5;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReport {
    pub queue: QueueSummary,
    pub loop_state: LoopState,
    pub history: HistorySummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueSummary {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    /// First few Pending missions, display text only.
    pub upcoming: Vec<String>,
    pub current: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoopState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_age_secs: Option<i64>,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<PauseSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    pub verbose: bool,
    pub restart_pending: bool,
    pub shutdown_pending: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PauseSummary {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistorySummary {
    pub tracked: usize,
    /// Missions that will be skipped on their next turn.
    pub at_limit: usize,
}

impl StatusReport {
    /// Snapshot of the queue, signals and history. Read-only except for an
    /// expired timed pause, which is lifted as a side effect of reading it.
    pub fn collect(ctx: &Context) -> anyhow::Result<Self> {
        let doc = ctx.queue().load()?;
        let signals = ctx.signals();
        let history = ctx.history().load();
        let max = ctx.config.agent.max_executions;

        let heartbeat_age_secs = signals.heartbeat_age();
        let stale_after = i64::try_from(ctx.config.bridge.heartbeat_stale_secs).unwrap_or(i64::MAX);

        Ok(Self {
            queue: QueueSummary {
                pending: doc.count(Section::Pending),
                in_progress: doc.count(Section::InProgress),
                done: doc.count(Section::Done),
                upcoming: doc
                    .missions(Section::Pending)
                    .into_iter()
                    .take(PENDING_PREVIEW)
                    .map(display_text)
                    .collect(),
                current: doc
                    .missions(Section::InProgress)
                    .into_iter()
                    .map(display_text)
                    .collect(),
            },
            loop_state: LoopState {
                heartbeat_age_secs,
                stale: heartbeat_age_secs.is_some_and(|age| age > stale_after),
                paused: signals.pause_state().map(|p| PauseSummary {
                    reason: p.reason,
                    until: p.until,
                }),
                focus: signals.focus(),
                verbose: signals.is_verbose(),
                restart_pending: signals.is_set(Signal::Restart),
                shutdown_pending: signals.is_set(Signal::Shutdown),
            },
            history: HistorySummary {
                tracked: history.len(),
                at_limit: history.values().filter(|e| e.count >= max).count(),
            },
        })
    }

    pub fn render_pretty(&self) -> String {
        let mut out = String::from("=== Missionbox Status ===\n\n");
        let q = &self.queue;
        let _ = writeln!(
            out,
            "Queue: {} pending, {} in progress, {} done",
            q.pending, q.in_progress, q.done
        );
        for mission in &q.current {
            let _ = writeln!(out, "  > {mission}");
        }
        for (i, mission) in q.upcoming.iter().enumerate() {
            let _ = writeln!(out, "  {}. {mission}", i + 1);
        }
        if q.pending > q.upcoming.len() {
            let _ = writeln!(out, "  ... and {} more", q.pending - q.upcoming.len());
        }

        let s = &self.loop_state;
        out.push_str("\nLoop: ");
        match s.heartbeat_age_secs {
            Some(age) if s.stale => {
                let _ = writeln!(out, "STALE (last heartbeat {} ago)", format_age(age));
            }
            Some(age) => {
                let _ = writeln!(out, "alive (last heartbeat {} ago)", format_age(age));
            }
            None => out.push_str("never started\n"),
        }
        if let Some(pause) = &s.paused {
            let _ = writeln!(out, "Paused: {}{}", pause_reason(pause), pause_until(pause));
        }
        if let Some(focus) = &s.focus {
            let _ = writeln!(out, "Focus: {focus}");
        }
        if s.verbose {
            out.push_str("Verbose: on\n");
        }
        if s.restart_pending {
            out.push_str("Restart: requested\n");
        }
        if s.shutdown_pending {
            out.push_str("Shutdown: requested\n");
        }
        let _ = writeln!(
            out,
            "\nHistory: {} tracked, {} at limit",
            self.history.tracked, self.history.at_limit
        );
        out
    }

    pub fn render_text(&self) -> String {
        let q = &self.queue;
        let s = &self.loop_state;
        let mut out = String::from("missionbox-status\n");
        let _ = writeln!(
            out,
            "queue  pending={}  in_progress={}  done={}",
            q.pending, q.in_progress, q.done
        );
        for mission in &q.upcoming {
            let _ = writeln!(out, "pending  {mission}");
        }
        let heartbeat = s
            .heartbeat_age_secs
            .map_or_else(|| "none".to_string(), |age| age.to_string());
        let _ = writeln!(out, "heartbeat  age={heartbeat}  stale={}", s.stale);
        let _ = writeln!(
            out,
            "signals  paused={}  focus={}  verbose={}  restart={}  shutdown={}",
            s.paused.is_some(),
            s.focus.as_deref().unwrap_or("-"),
            s.verbose,
            s.restart_pending,
            s.shutdown_pending
        );
        let _ = writeln!(
            out,
            "history  tracked={}  at_limit={}",
            self.history.tracked, self.history.at_limit
        );
        out
    }
}

fn pause_reason(pause: &PauseSummary) -> &str {
    if pause.reason.is_empty() {
        "no reason given"
    } else {
        &pause.reason
    }
}

fn pause_until(pause: &PauseSummary) -> String {
    pause
        .until
        .and_then(|t| Utc.timestamp_opt(t, 0).single())
        .map(|t| format!(" (until {})", t.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default()
}

/// Compact age: `42s`, `7m`, `3h`, `2d`.
pub fn format_age(secs: i64) -> String {
    let secs = secs.max(0);
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m", secs / 60),
        3600..86_400 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86_400),
    }
}

impl StatusArgs {
    pub fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let report = StatusReport::collect(ctx)?;
        match OutputFormat::resolve(self.format) {
            OutputFormat::Pretty => print!("{}", report.render_pretty()),
            OutputFormat::Text => print!("{}", report.render_text()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(())
    }
}
