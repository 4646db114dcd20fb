use std::process::ExitStatus;
use std::time::Duration;

use anyhow::Context as _;

use crate::context::Context;
use crate::error::{ExitError, RESTART_EXIT_CODE};
use crate::subprocess::run_attached;

/// Pause between a restart exit and the relaunch.
const RELAUNCH_DELAY: Duration = Duration::from_secs(1);

/// What the supervisor does after its child exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Relaunch,
    Finish,
    /// Exited with a non-zero status (or by signal).
    Fail(Option<i32>),
}

pub fn verdict(code: Option<i32>) -> Verdict {
    match code {
        Some(c) if c == i32::from(RESTART_EXIT_CODE) => Verdict::Relaunch,
        Some(0) => Verdict::Finish,
        other => Verdict::Fail(other),
    }
}

/// Argv for the supervised child: this binary running the agent loop.
pub fn child_argv(ctx: &Context) -> anyhow::Result<Vec<String>> {
    let exe = std::env::current_exe().context("locating current executable")?;
    Ok(vec![
        exe.to_string_lossy().into_owned(),
        "--project-root".to_string(),
        ctx.root.to_string_lossy().into_owned(),
        "run".to_string(),
        "loop".to_string(),
    ])
}

/// Run `argv` until it exits with anything other than the restart code.
pub fn supervise(argv: &[String], delay: Duration) -> anyhow::Result<()> {
    let mut launches: u32 = 0;
    loop {
        launches += 1;
        tracing::info!(launches, program = %argv.first().map_or("", String::as_str), "launching");
        let status: ExitStatus = run_attached(argv)?;
        match verdict(status.code()) {
            Verdict::Relaunch => {
                eprintln!("Child requested restart, relaunching");
                std::thread::sleep(delay);
            }
            Verdict::Finish => return Ok(()),
            Verdict::Fail(Some(code)) => {
                let code = u8::try_from(code).unwrap_or(1);
                return Err(ExitError::new(code, format!("supervised process exited with {code}")).into());
            }
            Verdict::Fail(None) => {
                return Err(ExitError::Other(format!("supervised process terminated: {status}")).into());
            }
        }
    }
}

/// Entry point for `missionbox run supervise`.
pub fn run_supervisor(ctx: &Context) -> anyhow::Result<()> {
    let argv = child_argv(ctx)?;
    eprintln!("Supervising agent loop for {}", ctx.root.display());
    supervise(&argv, RELAUNCH_DELAY)
}
