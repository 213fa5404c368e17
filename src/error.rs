use thiserror::Error;

/// Process exit codes for the supervisor's own lifecycle.
///
/// The supervised application's exit status is surfaced through logging and
/// never mapped onto the daemon's own exit code: a crashing child is not a
/// supervisor fault.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    /// Any fatal startup condition: bad flags, invalid port range, no free
    /// port, control channel never acquirable, spawn failure.
    pub const FATAL: i32 = 1;
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("no binary to execute")]
    NoCommand,

    #[error("invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("--port-range is mandatory when a debug mode is requested")]
    PortRangeRequired,

    #[error("--debug-gdb and --debug-qml are mutually exclusive")]
    ConflictingDebugModes,

    #[error("could not find an unused port in range")]
    NoFreePort,

    #[error("control endpoint is held by another instance that never released it")]
    ControlChannelBusy,

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Every error that escapes to main is a fatal startup condition.
    pub fn exit_code(&self) -> i32 {
        exit_codes::FATAL
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
