use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use appcontrollerd::cli::Cli;
use appcontrollerd::config::Defaults;
use appcontrollerd::control::ControlChannel;
use appcontrollerd::error::{AppError, exit_codes};
use appcontrollerd::launch::{self, DebugMode};
use appcontrollerd::ports::PortList;
use appcontrollerd::supervisor::{ExitOutcome, Supervisor};

// The whole daemon is one cooperative event loop; a single-threaded runtime
// is the concurrency model, not an optimization.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_logging() {
    // Child output owns stdout; daemon diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> appcontrollerd::Result<()> {
    let channel = ControlChannel::new(&cli.control_name);

    // Pure-client mode: one best-effort stop signal, exit 0 whether or not
    // a server was listening.
    if cli.stop {
        channel.signal_stop();
        return Ok(());
    }

    let defaults = Defaults::load(&cli.defaults_file);

    if cli.show_platform {
        println!("base:{}", defaults.base);
        println!("platform:{}", defaults.platform);
        return Ok(());
    }

    let config = cli.launch_config(defaults)?;

    // An unparsable range is fatal even before we know whether a port will
    // be needed.
    let mut ports = match cli.port_range.as_deref() {
        Some(spec) => Some(PortList::parse(spec)?),
        None => None,
    };

    let debug_port = match config.debug_mode {
        DebugMode::None => None,
        DebugMode::Gdb | DebugMode::Qml => {
            let ports = ports.as_mut().ok_or(AppError::PortRangeRequired)?;
            Some(ports.find_free_port().ok_or(AppError::NoFreePort)?)
        }
    };

    let plan = launch::resolve(&config, debug_port)?;

    if config.debug_mode == DebugMode::Qml
        && let Some(port) = debug_port
    {
        // Host tooling scrapes this exact line from stdout.
        println!("QML Debugger: Going to wait for connection on port {}...", port);
    }

    // Become the sole supervisor for this device, displacing any previous
    // instance, before anything is spawned.
    let control = channel.acquire().await?;

    let outcome = Supervisor::new(plan)
        .detach_from_controller(config.debug_mode == DebugMode::Gdb)
        .run(&control)
        .await?;

    match outcome {
        ExitOutcome::Exited(code) => tracing::info!(code, "application exited"),
        ExitOutcome::Killed(signal) => {
            tracing::warn!(signal, "application terminated by signal");
        }
        ExitOutcome::Stopped => tracing::info!("application stopped on request"),
    }

    // The child's failure is not a supervisor failure: having supervised the
    // launch to completion, the daemon itself exits cleanly.
    Ok(())
}
