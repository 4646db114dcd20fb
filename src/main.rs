use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use missionbox::commands::history::HistoryCommand;
use missionbox::commands::queue::QueueCommand;
use missionbox::commands::run::RunCommand;
use missionbox::commands::send::SendArgs;
use missionbox::commands::signal::SignalCommand;
use missionbox::commands::status::StatusArgs;
use missionbox::context::Context;
use missionbox::error::ExitError;
use missionbox::{commands, telemetry};

#[derive(Debug, Parser)]
#[command(
    name = "missionbox",
    version,
    about = "File-coordinated mission queue for autonomous agent loops"
)]
struct Cli {
    /// Project root directory (default: current directory)
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Inspect and edit the mission queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Raise or clear control signals (restart, shutdown, pause, focus, verbose)
    Signal {
        #[command(subcommand)]
        command: SignalCommand,
    },
    /// Inspect or prune mission execution history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// Run the agent loop, the messaging bridge or the supervisor
    Run {
        #[command(subcommand)]
        command: RunCommand,
    },
    /// Drop a message in the bridge inbox
    Send(SendArgs),
    /// Show queue and loop status
    Status(StatusArgs),
    /// Print the JSON Schema for .missionbox.toml
    Schema,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Queue { .. } => "queue",
            Self::Signal { .. } => "signal",
            Self::History { .. } => "history",
            Self::Run { .. } => "run",
            Self::Send(_) => "send",
            Self::Status(_) => "status",
            Self::Schema => "schema",
        }
    }
}

fn main() -> ExitCode {
    let _telemetry = telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Schema => commands::schema::run_schema(),
        command => Context::load(cli.project_root.as_deref()).and_then(|ctx| match command {
            Commands::Queue { command } => command.execute(&ctx),
            Commands::Signal { command } => command.execute(&ctx),
            Commands::History { command } => command.execute(&ctx),
            Commands::Run { command } => command.execute(&ctx),
            Commands::Send(args) => args.execute(&ctx),
            Commands::Status(args) => args.execute(&ctx),
            Commands::Schema => commands::schema::run_schema(),
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<ExitError>() {
            Some(ExitError::Restart) => ExitError::Restart.exit_code(),
            Some(exit_err) => {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            }
            None => {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}
