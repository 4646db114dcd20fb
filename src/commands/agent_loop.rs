use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::context::Context;
use crate::error::{ExitError, QueueError};
use crate::notify::Notifier;
use crate::queue::mission::{display_text, project_tag};
use crate::subprocess::Tool;

/// Exit code recorded when a mission hits its timeout, as `timeout(1)` does.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Longest output excerpt kept for logs and failure notifications.
const OUTPUT_EXCERPT: usize = 400;

/// Outcome of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStatus {
    /// A mission ran and exited 0.
    Completed(String),
    /// A mission ran and failed; it went back to Pending.
    Failed { mission: String, exit_code: i32 },
    /// A mission hit the execution limit and was moved to Done unrun.
    Skipped(String),
    /// Nothing eligible in Pending.
    Idle,
    Paused,
    Shutdown,
    Restart,
}

/// The work-executing loop: one mission per iteration.
pub struct AgentLoop<'a> {
    ctx: &'a Context,
    notifier: Box<dyn Notifier>,
}

impl<'a> AgentLoop<'a> {
    pub fn new(ctx: &'a Context, notifier: Box<dyn Notifier>) -> Self {
        Self { ctx, notifier }
    }

    /// One-time housekeeping before the first iteration.
    ///
    /// Missions left In Progress by a previous run go back on top of Pending.
    pub fn startup(&self) -> anyhow::Result<()> {
        let queue = self.ctx.queue();
        queue.migrate_legacy()?;
        let recovered = queue.recover_in_progress()?;
        if recovered > 0 {
            tracing::info!(recovered, "returned stranded missions to pending");
        }
        let history = &self.ctx.config.history;
        self.ctx
            .history()
            .cleanup_old_entries(history.max_age_hours, history.max_entries)?;
        self.beat();
        Ok(())
    }

    fn beat(&self) {
        if let Err(e) = self.ctx.signals().beat() {
            tracing::warn!(error = %e, "could not write heartbeat");
        }
    }

    /// Run a single iteration: check signals, then run at most one mission.
    pub fn run_once(&self) -> anyhow::Result<LoopStatus> {
        let signals = self.ctx.signals();
        self.beat();

        if signals.is_shutdown_requested(self.ctx.started_epoch) {
            return Ok(LoopStatus::Shutdown);
        }
        if signals.restart_requested(Some(self.ctx.started_at)) {
            return Ok(LoopStatus::Restart);
        }
        if let Some(pause) = signals.pause_state() {
            tracing::debug!(reason = %pause.reason, until = ?pause.until, "paused");
            return Ok(LoopStatus::Paused);
        }

        let queue = self.ctx.queue();
        let focus = signals.focus();
        let Some(line) = queue.next_pending(focus.as_deref())? else {
            return Ok(LoopStatus::Idle);
        };
        let text = display_text(&line);

        let history = self.ctx.history();
        let max = self.ctx.config.agent.max_executions;
        if history.should_skip(&line, max) {
            let reason = format!("ran {max} times");
            if !self.moved(queue.skip(&line, &reason), &text)? {
                return Ok(LoopStatus::Idle);
            }
            tracing::warn!(mission = %text, max, "execution limit reached, skipping");
            self.notifier
                .send(&format!("Skipped mission after {max} attempts: {text}"));
            return Ok(LoopStatus::Skipped(text));
        }

        if !self.moved(queue.start(&line), &text)? {
            return Ok(LoopStatus::Idle);
        }
        let verbose = signals.is_verbose();
        if verbose {
            self.notifier.send(&format!("Starting mission: {text}"));
        }

        let (exit_code, stderr) = match self.execute(&line, &text) {
            Ok(outcome) => outcome,
            Err(e) => {
                // The agent could not be launched at all; leave the mission for the next run.
                self.moved(queue.requeue(&line), &text)?;
                return Err(e);
            }
        };
        let project = project_tag(&line);
        history.record_execution(&line, project, exit_code)?;

        if exit_code == 0 {
            self.moved(queue.complete(&line, None), &text)?;
            let trimmed = queue.trim_done(self.ctx.config.queue.done_keep)?;
            if trimmed > 0 {
                tracing::debug!(trimmed, "trimmed done section");
            }
            tracing::info!(mission = %text, "mission completed");
            if verbose {
                self.notifier.send(&format!("Completed mission: {text}"));
            }
            Ok(LoopStatus::Completed(text))
        } else {
            self.moved(queue.requeue(&line), &text)?;
            tracing::warn!(mission = %text, exit_code, "mission failed");
            let mut message = format!("Mission failed (exit {exit_code}): {text}");
            if !stderr.is_empty() {
                message.push_str("\n\n");
                message.push_str(&stderr);
            }
            self.notifier.send(&message);
            Ok(LoopStatus::Failed {
                mission: text,
                exit_code,
            })
        }
    }

    /// Settle a queue transition for `text`.
    ///
    /// Returns false when the line was no longer where the loop left it (the
    /// file was edited or another writer won the race). That is reported and
    /// the loop carries on; only I/O failures are errors.
    fn moved(&self, result: Result<(), QueueError>, text: &str) -> Result<bool, QueueError> {
        match result {
            Ok(()) => Ok(true),
            Err(QueueError::NotInSection { section, line }) => {
                tracing::warn!(
                    mission = %text,
                    section,
                    line = %line,
                    "mission moved out from under the loop"
                );
                self.notifier.send(&format!(
                    "Mission no longer in {section}, leaving the queue as found: {text}"
                ));
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Run the agent command for one mission. Returns its exit code and a
    /// stderr excerpt; a timeout counts as [`TIMEOUT_EXIT_CODE`].
    fn execute(&self, line: &str, text: &str) -> anyhow::Result<(i32, String)> {
        let agent = &self.ctx.config.agent;
        let tool = Tool::from_argv(&agent.command)?
            .arg(text)
            .env("MISSIONBOX_MISSION", text)
            .env("MISSIONBOX_PROJECT", project_tag(line).unwrap_or(""))
            .current_dir(&self.ctx.root)
            .timeout(Duration::from_secs(agent.timeout));

        tracing::info!(mission = %text, program = tool.program(), "running mission");
        match tool.run() {
            Ok(output) => {
                tracing::debug!(
                    mission = %text,
                    exit_code = output.exit_code,
                    stdout = %tail(&output.stdout, OUTPUT_EXCERPT),
                    "agent finished"
                );
                Ok((output.exit_code, tail(&output.stderr, OUTPUT_EXCERPT)))
            }
            Err(e) => match e.downcast_ref::<ExitError>() {
                Some(ExitError::Timeout { timeout_secs, .. }) => Ok((
                    TIMEOUT_EXIT_CODE,
                    format!("timed out after {timeout_secs}s"),
                )),
                _ => Err(e),
            },
        }
    }
}

fn tail(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().rev().nth(max.saturating_sub(1)) {
        Some((i, _)) if i > 0 => format!("...{}", &text[i..]),
        _ => text.to_string(),
    }
}

/// Entry point for `missionbox run loop`.
///
/// Returns `ExitError::Restart` when a restart is requested, so the process
/// exits with the reserved restart code.
pub fn run_agent_loop(ctx: &Context) -> anyhow::Result<()> {
    let stop = super::install_interrupt_flag();
    let agent_loop = AgentLoop::new(ctx, ctx.notifier());
    agent_loop.startup()?;

    let poll = Duration::from_secs(ctx.config.agent.poll_interval.max(1));
    eprintln!(
        "Agent loop started: queue {}, state {}",
        ctx.queue_path.display(),
        ctx.state_dir.display()
    );

    let mut iteration: u32 = 0;
    while !stop.load(Ordering::SeqCst) {
        if let Some(max) = ctx.config.agent.max_loops
            && iteration >= max
        {
            eprintln!("Reached max loops ({max}), exiting");
            break;
        }
        iteration += 1;

        let _span = tracing::info_span!("iteration", n = iteration).entered();
        match agent_loop.run_once()? {
            LoopStatus::Shutdown => {
                eprintln!("Shutdown requested, exiting");
                break;
            }
            LoopStatus::Restart => {
                eprintln!("Restart requested, exiting for relaunch");
                return Err(ExitError::Restart.into());
            }
            LoopStatus::Idle | LoopStatus::Paused => super::sleep_unless(&stop, poll),
            LoopStatus::Completed(_) | LoopStatus::Failed { .. } | LoopStatus::Skipped(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::SystemTime;

    use super::*;
    use crate::config::Config;
    use crate::notify::testing::RecordingNotifier;
    use crate::queue::Section;

    fn context(dir: &Path, script: &str) -> Context {
        let mut config = Config::default();
        config.agent.command = vec!["sh".into(), "-c".into(), script.into()];
        config.agent.timeout = 10;
        Context::new(dir.to_path_buf(), config)
    }

    fn agent_loop(ctx: &Context) -> (AgentLoop<'_>, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        (AgentLoop::new(ctx, Box::new(notifier.clone())), notifier)
    }

    #[test]
    fn successful_mission_moves_to_done() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        ctx.queue().insert_pending("first task", false).unwrap();
        ctx.queue().insert_pending("second task", false).unwrap();
        let (agent, notifier) = agent_loop(&ctx);

        let status = agent.run_once().unwrap();
        assert_eq!(status, LoopStatus::Completed("first task".into()));
        assert_eq!(ctx.queue().list(Section::Pending).unwrap(), vec!["- second task"]);
        assert!(ctx.queue().list(Section::InProgress).unwrap().is_empty());
        assert_eq!(ctx.queue().list(Section::Done).unwrap(), vec!["- first task"]);
        assert_eq!(ctx.history().get_execution_count("first task"), 1);
        assert!(notifier.messages().is_empty());
        assert!(ctx.signals().heartbeat_age().is_some());
    }

    #[test]
    fn mission_text_and_env_reach_the_agent() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("seen.txt");
        let script = format!(
            "printf '%s|%s|%s' \"$0\" \"$MISSIONBOX_MISSION\" \"$MISSIONBOX_PROJECT\" > {}",
            out.display()
        );
        let ctx = context(dir.path(), &script);
        ctx.queue().insert_pending("[project:web] fix login", false).unwrap();
        let (agent, _) = agent_loop(&ctx);

        agent.run_once().unwrap();
        let seen = std::fs::read_to_string(out).unwrap();
        assert_eq!(seen, "fix login|fix login|web");
    }

    #[test]
    fn failed_mission_is_requeued_then_skipped_at_limit() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "echo broken >&2; exit 3");
        ctx.queue().insert_pending("flaky", false).unwrap();
        let (agent, notifier) = agent_loop(&ctx);

        for _ in 0..3 {
            let status = agent.run_once().unwrap();
            assert_eq!(
                status,
                LoopStatus::Failed {
                    mission: "flaky".into(),
                    exit_code: 3
                }
            );
            assert_eq!(ctx.queue().list(Section::Pending).unwrap(), vec!["- flaky"]);
        }
        assert_eq!(ctx.history().get_execution_count("flaky"), 3);

        assert_eq!(agent.run_once().unwrap(), LoopStatus::Skipped("flaky".into()));
        assert!(ctx.queue().list(Section::Pending).unwrap().is_empty());
        let done = ctx.queue().list(Section::Done).unwrap();
        assert_eq!(done, vec!["- flaky (skipped: ran 3 times)"]);

        let messages = notifier.messages();
        assert_eq!(messages.len(), 4);
        assert!(messages[0].contains("exit 3"));
        assert!(messages[0].contains("broken"));
        assert!(messages[3].starts_with("Skipped mission"));
        assert_eq!(agent.run_once().unwrap(), LoopStatus::Idle);
    }

    #[test]
    fn timeout_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "sleep 10");
        ctx.config.agent.timeout = 0;
        ctx.queue().insert_pending("slow", false).unwrap();
        let (agent, notifier) = agent_loop(&ctx);

        let status = agent.run_once().unwrap();
        assert_eq!(
            status,
            LoopStatus::Failed {
                mission: "slow".into(),
                exit_code: TIMEOUT_EXIT_CODE
            }
        );
        assert_eq!(ctx.history().load()["slow"].last_exit_code, TIMEOUT_EXIT_CODE);
        assert!(notifier.messages()[0].contains("timed out"));
    }

    #[test]
    fn missing_agent_command_requeues_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "exit 0");
        ctx.config.agent.command = vec!["missionbox-no-such-agent".into()];
        ctx.queue().insert_pending("task", false).unwrap();
        let (agent, _) = agent_loop(&ctx);

        let err = agent.run_once().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExitError>(),
            Some(ExitError::ToolNotFound { .. })
        ));
        assert_eq!(ctx.queue().list(Section::Pending).unwrap(), vec!["- task"]);
        assert_eq!(ctx.history().get_execution_count("task"), 0);
    }

    #[test]
    fn empty_queue_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        let (agent, _) = agent_loop(&ctx);
        assert_eq!(agent.run_once().unwrap(), LoopStatus::Idle);
        assert!(!ctx.queue_path.exists());
    }

    #[test]
    fn fresh_shutdown_stops_before_touching_queue() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        ctx.queue().insert_pending("task", false).unwrap();
        ctx.signals().request_shutdown_at(ctx.started_epoch + 1).unwrap();
        let (agent, _) = agent_loop(&ctx);

        assert_eq!(agent.run_once().unwrap(), LoopStatus::Shutdown);
        assert_eq!(ctx.queue().list(Section::Pending).unwrap(), vec!["- task"]);
    }

    #[test]
    fn stale_shutdown_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        ctx.signals().request_shutdown_at(ctx.started_epoch - 60).unwrap();
        let (agent, _) = agent_loop(&ctx);

        assert_eq!(agent.run_once().unwrap(), LoopStatus::Idle);
        assert!(ctx.signals().read(crate::signals::Signal::Shutdown).is_none());
    }

    #[test]
    fn restart_marker_newer_than_start_requests_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "exit 0");
        ctx.started_at = SystemTime::now() - Duration::from_secs(5);
        ctx.signals().request_restart("deploy").unwrap();
        let (agent, _) = agent_loop(&ctx);
        assert_eq!(agent.run_once().unwrap(), LoopStatus::Restart);
    }

    #[test]
    fn restart_marker_older_than_start_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "exit 0");
        ctx.signals().request_restart("old").unwrap();
        ctx.started_at = SystemTime::now() + Duration::from_secs(5);
        let (agent, _) = agent_loop(&ctx);
        assert_eq!(agent.run_once().unwrap(), LoopStatus::Idle);
    }

    #[test]
    fn pause_blocks_work_until_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        ctx.queue().insert_pending("task", false).unwrap();
        ctx.signals().request_pause("maintenance", None).unwrap();
        let (agent, _) = agent_loop(&ctx);

        assert_eq!(agent.run_once().unwrap(), LoopStatus::Paused);
        ctx.signals().resume().unwrap();
        assert_eq!(agent.run_once().unwrap(), LoopStatus::Completed("task".into()));
    }

    #[test]
    fn focus_selects_matching_project() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        ctx.queue().insert_pending("[project:api] api work", false).unwrap();
        ctx.queue().insert_pending("[project:web] web work", false).unwrap();
        ctx.signals().set_focus("web").unwrap();
        let (agent, _) = agent_loop(&ctx);

        assert_eq!(agent.run_once().unwrap(), LoopStatus::Completed("web work".into()));
        assert_eq!(
            ctx.queue().list(Section::Pending).unwrap(),
            vec!["- [project:api] api work"]
        );
    }

    #[test]
    fn verbose_reports_start_and_completion() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        ctx.queue().insert_pending("task", false).unwrap();
        ctx.signals().set_verbose(true).unwrap();
        let (agent, notifier) = agent_loop(&ctx);

        agent.run_once().unwrap();
        assert_eq!(
            notifier.messages(),
            vec!["Starting mission: task", "Completed mission: task"]
        );
    }

    #[test]
    fn startup_recovers_stranded_missions() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        std::fs::write(
            &ctx.queue_path,
            "# Missions\n\n## Pending\n\n- queued\n\n## In Progress\n\n- stranded\n\n## Done\n",
        )
        .unwrap();
        let (agent, _) = agent_loop(&ctx);

        agent.startup().unwrap();
        assert_eq!(
            ctx.queue().list(Section::Pending).unwrap(),
            vec!["- stranded", "- queued"]
        );
        assert!(ctx.queue().list(Section::InProgress).unwrap().is_empty());
    }

    #[test]
    fn startup_migrates_legacy_headers() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        std::fs::write(
            &ctx.queue_path,
            "# Missions\n\n## En attente\n\n- vieux\n\n## En cours\n\n## Terminées\n",
        )
        .unwrap();
        let (agent, _) = agent_loop(&ctx);

        agent.startup().unwrap();
        assert_eq!(ctx.queue().list(Section::Pending).unwrap(), vec!["- vieux"]);
    }

    #[test]
    fn completed_missions_trim_done_section() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "exit 0");
        ctx.config.queue.done_keep = 1;
        ctx.queue().insert_pending("a", false).unwrap();
        ctx.queue().insert_pending("b", false).unwrap();
        let (agent, _) = agent_loop(&ctx);

        agent.run_once().unwrap();
        agent.run_once().unwrap();
        assert_eq!(ctx.queue().list(Section::Done).unwrap(), vec!["- b"]);
    }

    #[test]
    fn mission_removed_by_the_agent_does_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            dir.path(),
            "printf '# Missions\\n\\n## Pending\\n\\n## In Progress\\n\\n## Done\\n' > missions.md",
        );
        ctx.queue().insert_pending("task", false).unwrap();
        let (agent, notifier) = agent_loop(&ctx);

        assert_eq!(agent.run_once().unwrap(), LoopStatus::Completed("task".into()));
        assert_eq!(ctx.history().get_execution_count("task"), 1);
        assert!(ctx.queue().list(Section::Done).unwrap().is_empty());
        assert!(notifier.messages()[0].contains("no longer in In Progress"));
        assert_eq!(agent.run_once().unwrap(), LoopStatus::Idle);
    }

    #[test]
    fn failed_mission_removed_by_the_agent_is_not_requeued() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            dir.path(),
            "printf '## Pending\\n\\n## In Progress\\n' > missions.md; exit 2",
        );
        ctx.queue().insert_pending("task", false).unwrap();
        let (agent, _) = agent_loop(&ctx);

        assert_eq!(
            agent.run_once().unwrap(),
            LoopStatus::Failed {
                mission: "task".into(),
                exit_code: 2
            }
        );
        assert!(ctx.queue().list(Section::Pending).unwrap().is_empty());
    }

    #[test]
    fn repeated_pending_header_leaves_loop_idle() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "exit 0");
        std::fs::write(
            &ctx.queue_path,
            "## Pending\n\n## In Progress\n\n## Done\n\n## Pending\n\n- task\n",
        )
        .unwrap();
        let (agent, _) = agent_loop(&ctx);

        assert_eq!(agent.run_once().unwrap(), LoopStatus::Idle);
        assert_eq!(agent.run_once().unwrap(), LoopStatus::Idle);
        assert_eq!(ctx.history().get_execution_count("task"), 0);
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("  short  ", 10), "short");
        assert_eq!(tail("abcdef", 3), "...def");
    }
}
