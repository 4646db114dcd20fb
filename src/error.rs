use std::process::ExitCode;

/// Exit status reserved for "terminated intentionally, relaunch me".
///
/// Never used for any other outcome, so a supervisor can tell a requested
/// restart apart from success or failure.
pub const RESTART_EXIT_CODE: u8 = 42;

/// Errors that cause missionbox to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("{tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("restart requested")]
    Restart,

    #[error("{message}")]
    WithCode { code: u8, message: String },

    #[error("{0}")]
    Other(String),
}

impl ExitError {
    pub const fn new(code: u8, message: String) -> Self {
        Self::WithCode { code, message }
    }

    pub const fn code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::ToolNotFound { .. } => 3,
            Self::Timeout { .. } => 5,
            Self::Restart => RESTART_EXIT_CODE,
            Self::WithCode { code, .. } => *code,
            Self::Other(_) => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

/// A queue mutation that cannot be satisfied.
///
/// These are user-facing: the CLI prints them and the bridge replies with
/// them, nothing is written when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("no pending missions")]
    Empty,

    #[error("invalid position {index}: queue has {len} pending mission(s)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no pending mission matches {keyword:?}")]
    NoMatch { keyword: String },

    #[error("cancel needs a position or a keyword")]
    BlankIdentifier,

    #[error("mission text is empty")]
    EmptyMission,

    #[error("mission not found in {section}: {line}")]
    NotInSection { section: &'static str, line: String },

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A bounded collection was asked for zero capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("capacity must be at least 1, got {0}")]
pub struct InvalidCapacity(pub usize);
