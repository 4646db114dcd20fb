use clap::Subcommand;

use crate::context::Context;
use crate::error::ExitError;
use crate::signals::{Signal, Signals, epoch_secs};

#[derive(Debug, Subcommand)]
pub enum SignalCommand {
    /// Ask running loops and bridges to restart themselves
    Restart {
        /// Why (recorded in the marker)
        #[arg(default_value = "manual")]
        reason: String,
    },
    /// Ask every process started before now to exit
    Shutdown,
    /// Pause the loop between missions
    Pause {
        /// Resume automatically after this many minutes
        #[arg(long)]
        minutes: Option<u64>,
        /// Reason shown in status
        #[arg(trailing_var_arg = true)]
        reason: Vec<String>,
    },
    /// Lift a pause
    Resume,
    /// Only run missions for this project (untagged missions still run)
    Focus { project: String },
    /// Drop the project focus
    Unfocus,
    /// Notify at every mission start and finish
    Verbose,
    /// Stop per-mission notifications
    Quiet,
    /// Remove a signal file (restart, shutdown, pause, heartbeat, focus, verbose)
    Clear {
        /// Signal name; omit with --all to clear everything
        name: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

/// `until` epoch for a pause of `minutes` starting at `now`.
pub fn pause_deadline(now: i64, minutes: Option<u64>) -> Option<i64> {
    minutes
        .filter(|m| *m > 0)
        .map(|m| now.saturating_add(i64::try_from(m.saturating_mul(60)).unwrap_or(i64::MAX)))
}

impl SignalCommand {
    pub fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let signals = ctx.signals();
        match self {
            Self::Restart { reason } => {
                signals.request_restart(reason)?;
                println!("Restart requested");
            }
            Self::Shutdown => {
                let at = signals.request_shutdown()?;
                println!("Shutdown requested at {at}");
            }
            Self::Pause { minutes, reason } => {
                let until = pause_deadline(epoch_secs(), *minutes);
                signals.request_pause(&reason.join(" "), until)?;
                match minutes {
                    Some(m) if until.is_some() => println!("Paused for {m} minute(s)"),
                    _ => println!("Paused until resumed"),
                }
            }
            Self::Resume => {
                signals.resume()?;
                println!("Resumed");
            }
            Self::Focus { project } => {
                if project.trim().is_empty() {
                    return Err(ExitError::Other("project name is empty".to_string()).into());
                }
                signals.set_focus(project)?;
                println!("Focused on {}", project.trim());
            }
            Self::Unfocus => {
                signals.clear_focus()?;
                println!("Focus cleared");
            }
            Self::Verbose => {
                signals.set_verbose(true)?;
                println!("Verbose notifications on");
            }
            Self::Quiet => {
                signals.set_verbose(false)?;
                println!("Verbose notifications off");
            }
            Self::Clear { name, all } => clear(&signals, name.as_deref(), *all)?,
        }
        Ok(())
    }
}

fn clear(signals: &Signals, name: Option<&str>, all: bool) -> anyhow::Result<()> {
    match (name, all) {
        (_, true) => {
            for signal in Signal::ALL {
                signals.clear(signal)?;
            }
            println!("All signals cleared");
        }
        (Some(name), false) => {
            let signal = Signal::from_name(name)
                .ok_or_else(|| ExitError::Other(format!("unknown signal: {name}")))?;
            signals.clear(signal)?;
            println!("Cleared {}", signal.name());
        }
        (None, false) => {
            return Err(ExitError::Other("name a signal or pass --all".to_string()).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_deadline_in_minutes() {
        assert_eq!(pause_deadline(1_000, Some(2)), Some(1_120));
        assert_eq!(pause_deadline(1_000, None), None);
        assert_eq!(pause_deadline(1_000, Some(0)), None);
    }

    #[test]
    fn clear_all_removes_every_signal() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::new(dir.path());
        signals.request_restart("x").unwrap();
        signals.set_focus("web").unwrap();
        signals.beat().unwrap();
        clear(&signals, None, true).unwrap();
        assert!(Signal::ALL.iter().all(|s| !signals.is_set(*s)));
    }

    #[test]
    fn clear_rejects_unknown_name() {
        let dir = tempfile::tempdir().unwrap();
        let signals = Signals::new(dir.path());
        assert!(clear(&signals, Some("bogus"), false).is_err());
        assert!(clear(&signals, None, false).is_err());
        signals.set_verbose(true).unwrap();
        clear(&signals, Some("Verbose"), false).unwrap();
        assert!(!signals.is_verbose());
    }
}
