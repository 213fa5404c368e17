//! Launch planning: from parsed invocation to the final child command line.
//!
//! [`resolve`] is a pure transformation. Given the same [`LaunchConfig`] and
//! port it always produces the same [`ResolvedPlan`], which makes every
//! argument-assembly rule directly testable without touching the OS.

use std::collections::HashMap;

use crate::config::Defaults;
use crate::error::{AppError, Result};

/// Command used to wrap the target binary in native-debug mode.
pub const GDBSERVER: &str = "gdbserver";

/// Which debug transport, if any, a launch should negotiate.
///
/// The modes are mutually exclusive; only one can be requested per
/// invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugMode {
    /// Plain launch, no debug connectivity.
    #[default]
    None,
    /// Wrap the target in a remote gdbserver stub listening on a discovered
    /// port.
    Gdb,
    /// Instrument the target with a QML debugger socket on a discovered
    /// port, blocking until the remote inspector attaches.
    Qml,
}

/// Everything needed to assemble one launch. Built once at startup and
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Target binary, consumed verbatim from the command line.
    pub binary: String,
    /// The target's own arguments, verbatim and unreordered.
    pub args: Vec<String>,
    pub debug_mode: DebugMode,
    /// Device defaults merged into the launch.
    pub defaults: Defaults,
}

/// The fully assembled child command line and environment for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlan {
    /// Final argument vector. `argv[0]` is always the effective entry
    /// command: the target binary, or `gdbserver` in native-debug mode.
    pub argv: Vec<String>,
    /// Environment overrides applied on top of the inherited environment.
    /// File entries win over same-named inherited variables.
    pub env: HashMap<String, String>,
    /// The reserved debug port, when a debug mode was requested.
    pub debug_port: Option<u16>,
}

/// Derive the final child command line from a launch configuration.
///
/// Rules, in order: defaults-file arguments are appended after the user
/// arguments; QML mode inserts its instrumentation flag immediately after
/// the binary; GDB mode wraps the whole command line in `gdbserver`.
///
/// # Errors
///
/// Returns `PortRangeRequired` if a debug mode was requested without a
/// discovered port.
pub fn resolve(config: &LaunchConfig, debug_port: Option<u16>) -> Result<ResolvedPlan> {
    let mut tail = Vec::with_capacity(config.args.len() + config.defaults.args.len());
    tail.extend(config.args.iter().cloned());
    tail.extend(config.defaults.args.iter().cloned());

    let argv = match (config.debug_mode, debug_port) {
        (DebugMode::None, _) => {
            let mut argv = vec![config.binary.clone()];
            argv.extend(tail);
            argv
        }
        (DebugMode::Qml, Some(port)) => {
            // The instrumentation flag always immediately follows the program
            // name and precedes all user arguments.
            let mut argv = vec![
                config.binary.clone(),
                format!("-qmljsdebugger=port:{port},block"),
            ];
            argv.extend(tail);
            argv
        }
        (DebugMode::Gdb, Some(port)) => {
            // The debugger becomes the spawned process; the target binary is
            // its first argument.
            let mut argv = vec![
                GDBSERVER.to_string(),
                format!("localhost:{port}"),
                config.binary.clone(),
            ];
            argv.extend(tail);
            argv
        }
        (DebugMode::Qml | DebugMode::Gdb, None) => return Err(AppError::PortRangeRequired),
    };

    Ok(ResolvedPlan {
        argv,
        env: config.defaults.env.clone(),
        debug_port,
    })
}
