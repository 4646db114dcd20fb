//! Tracing subscriber setup.
//!
//! `MISSIONBOX_LOG` takes an env-filter directive (default `info`).
//! `MISSIONBOX_LOG_FORMAT=json` switches to one JSON object per line.
//! Output always goes to stderr so stdout stays clean for command output.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

pub const LOG_ENV: &str = "MISSIONBOX_LOG";
pub const LOG_FORMAT_ENV: &str = "MISSIONBOX_LOG_FORMAT";

/// Keeps telemetry alive for the life of `main`.
#[must_use]
pub struct Telemetry {
    _private: (),
}

pub fn init() -> Telemetry {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::NONE);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    if let Err(e) = result {
        eprintln!("Warning: could not initialise logging: {e}");
    }

    Telemetry { _private: () }
}
