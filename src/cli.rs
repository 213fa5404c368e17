//! Command-line surface.
//!
//! Flags are parsed up to the first non-flag token; that token and
//! everything after it are the target binary and its arguments, consumed
//! verbatim and never reordered here.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{DEFAULTS_FILE, Defaults};
use crate::control::CONTROL_SOCKET_NAME;
use crate::error::{AppError, Result};
use crate::launch::{DebugMode, LaunchConfig};

/// Launch, monitor, and remotely stop one application on this device.
#[derive(Debug, Parser)]
#[command(name = "appcontrollerd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Signal the running instance to stop, then exit.
    #[arg(long)]
    pub stop: bool,

    /// Print the device's base and platform identifiers, then exit.
    #[arg(long)]
    pub show_platform: bool,

    /// Candidate debug ports: comma-separated ports and inclusive ranges,
    /// e.g. "10000-10019". Mandatory with either debug mode.
    #[arg(long, value_name = "RANGE")]
    pub port_range: Option<String>,

    /// Wrap the target in gdbserver listening on a discovered port.
    #[arg(long, conflicts_with = "debug_qml")]
    pub debug_gdb: bool,

    /// Instrument the target for QML debugging on a discovered port.
    #[arg(long)]
    pub debug_qml: bool,

    /// Control endpoint name override, for test isolation.
    #[arg(long, env = "APPCONTROLLER_CONTROL_NAME", default_value = CONTROL_SOCKET_NAME, hide = true)]
    pub control_name: String,

    /// Defaults-file path override, for test isolation.
    #[arg(long, env = "APPCONTROLLER_CONF", default_value = DEFAULTS_FILE, hide = true)]
    pub defaults_file: PathBuf,

    /// Target binary and its arguments, passed through verbatim.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "BINARY [ARGS]...")]
    pub command: Vec<String>,
}

impl Cli {
    /// Assemble the immutable launch configuration for a normal launch.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingDebugModes` if both debug toggles were requested
    /// (also enforced at parse time) and `NoCommand` when no target binary
    /// was given.
    pub fn launch_config(&self, defaults: Defaults) -> Result<LaunchConfig> {
        let debug_mode = match (self.debug_gdb, self.debug_qml) {
            (true, true) => return Err(AppError::ConflictingDebugModes),
            (true, false) => DebugMode::Gdb,
            (false, true) => DebugMode::Qml,
            (false, false) => DebugMode::None,
        };

        let mut command = self.command.iter();
        let binary = command.next().cloned().ok_or(AppError::NoCommand)?;

        Ok(LaunchConfig {
            binary,
            args: command.cloned().collect(),
            debug_mode,
            defaults,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("appcontrollerd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_target_argv_is_verbatim() {
        let cli = parse(&["--debug-qml", "--port-range", "10000-10010", "/bin/app", "-x", "--stop"]);
        assert!(cli.debug_qml);
        assert_eq!(cli.port_range.as_deref(), Some("10000-10010"));
        // Tokens after the binary are the target's, even when they collide
        // with our own flag names.
        assert_eq!(cli.command, vec!["/bin/app", "-x", "--stop"]);
        assert!(!cli.stop);
    }

    #[test]
    fn test_debug_modes_conflict_at_parse_time() {
        let result = Cli::try_parse_from(["appcontrollerd", "--debug-gdb", "--debug-qml", "/bin/app"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_launch_config_rejects_conflicting_modes() {
        let mut cli = parse(&["/bin/app"]);
        cli.debug_gdb = true;
        cli.debug_qml = true;
        assert!(matches!(
            cli.launch_config(Defaults::default()),
            Err(AppError::ConflictingDebugModes)
        ));
    }

    #[test]
    fn test_launch_config_requires_a_binary() {
        let cli = parse(&[]);
        assert!(matches!(
            cli.launch_config(Defaults::default()),
            Err(AppError::NoCommand)
        ));
    }

    #[test]
    fn test_launch_config_splits_binary_and_args() {
        let cli = parse(&["--debug-gdb", "/bin/app", "-a", "-b"]);
        let config = cli.launch_config(Defaults::default()).unwrap();
        assert_eq!(config.binary, "/bin/app");
        assert_eq!(config.args, vec!["-a", "-b"]);
        assert_eq!(config.debug_mode, DebugMode::Gdb);
    }
}
