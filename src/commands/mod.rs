pub mod agent_loop;
pub mod bridge;
pub mod history;
pub mod queue;
pub mod run;
pub mod schema;
pub mod send;
pub mod signal;
pub mod status;
pub mod supervise;

use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Output format for reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

impl OutputFormat {
    /// Pretty on a terminal, plain text when piped.
    pub fn resolve(format: Option<Self>) -> Self {
        format.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                Self::Pretty
            } else {
                Self::Text
            }
        })
    }
}

/// Set a flag on SIGINT/SIGTERM instead of exiting on the spot.
///
/// The loops only look at it between iterations, so an in-flight mission
/// always runs to completion.
pub(crate) fn install_interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Received interrupt signal, stopping after the current iteration...");
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }
    flag
}

/// Sleep for `duration`, waking early if `stop` is set.
pub(crate) fn sleep_unless(stop: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(250)));
    }
}
