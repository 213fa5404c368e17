//! Child-process supervision.
//!
//! The supervisor owns the child for its whole lifetime: it spawns the
//! resolved command line, forwards the child's output streams to its own as
//! raw byte chunks, and multiplexes child termination with inbound stop
//! requests on the control channel. All of this runs on one event loop; the
//! only mutable state is the child handle, touched exclusively by the loop.
//!
//! On Unix the child is made the leader of a fresh session and process
//! group at spawn, so stop requests can signal the entire child tree (the
//! debugger and its debuggee in native-debug mode) as one unit.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::control::ControlListener;
use crate::error::{AppError, Result};
use crate::launch::ResolvedPlan;

/// Grace period between SIGTERM and SIGKILL when honoring a stop request.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// How long to wait for pipe EOF when flushing output after termination.
/// A grandchild holding the write end open must not wedge shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Terminal state of one supervised launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The child exited on its own with this code.
    Exited(i32),
    /// The child was terminated by this signal.
    Killed(i32),
    /// The child was terminated because a stop request arrived on the
    /// control channel.
    Stopped,
}

/// Supervises exactly one child process from spawn to terminal state.
pub struct Supervisor {
    plan: ResolvedPlan,
    detach_from_controller: bool,
}

impl Supervisor {
    pub fn new(plan: ResolvedPlan) -> Self {
        Self {
            plan,
            detach_from_controller: false,
        }
    }

    /// Detach the daemon into its own process group and session before the
    /// child is spawned.
    ///
    /// Native-debug mode requires this so the debugger and debuggee form a
    /// job independent of the invoking shell or terminal. Detachment is an
    /// explicit pre-spawn step and happens strictly before the event loop
    /// starts accepting input.
    pub fn detach_from_controller(mut self, detach: bool) -> Self {
        self.detach_from_controller = detach;
        self
    }

    /// Spawn the child and supervise it to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns `Spawn` if the child cannot be started at all; the event loop
    /// is never entered in that case.
    pub async fn run(self, control: &ControlListener) -> Result<ExitOutcome> {
        if self.detach_from_controller {
            detach_session();
        }

        let mut child = spawn_child(&self.plan)?;
        let pid = child
            .id()
            .ok_or_else(|| AppError::Io(io::Error::other("spawned child has no pid")))?
            as i32;
        tracing::info!(pid, command = %self.plan.argv[0], "application started");

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Io(io::Error::other("child stdout was not piped")))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Io(io::Error::other("child stderr was not piped")))?;

        let mut out_sink = tokio::io::stdout();
        let mut err_sink = tokio::io::stderr();
        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut out_open = true;
        let mut err_open = true;

        loop {
            tokio::select! {
                // Any inbound connection on the control endpoint is a stop
                // request, regardless of payload.
                _ = control.stop_requested() => {
                    tracing::info!(pid, "stop requested, terminating application");
                    terminate(&mut child, pid).await?;
                    flush_remaining(&mut stdout, out_open, &mut out_sink).await;
                    flush_remaining(&mut stderr, err_open, &mut err_sink).await;
                    return Ok(ExitOutcome::Stopped);
                }

                read = stdout.read(&mut out_buf), if out_open => {
                    match read? {
                        0 => out_open = false,
                        n => forward(&out_buf[..n], &mut out_sink).await?,
                    }
                }

                read = stderr.read(&mut err_buf), if err_open => {
                    match read? {
                        0 => err_open = false,
                        n => forward(&err_buf[..n], &mut err_sink).await?,
                    }
                }

                status = child.wait() => {
                    let status = status?;
                    flush_remaining(&mut stdout, out_open, &mut out_sink).await;
                    flush_remaining(&mut stderr, err_open, &mut err_sink).await;
                    return Ok(outcome_of(status));
                }
            }
        }
    }
}

/// Spawn the planned command line with piped output streams.
///
/// Defaults-file environment overrides are applied on top of the inherited
/// environment, so file entries win over same-named inherited variables.
fn spawn_child(plan: &ResolvedPlan) -> Result<Child> {
    let (program, args) = plan.argv.split_first().ok_or(AppError::NoCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (key, value) in &plan.env {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    // SAFETY: setsid() is async-signal-safe and only makes the child the
    // leader of a fresh session and process group.
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd.spawn().map_err(|source| AppError::Spawn {
        command: program.clone(),
        source,
    })
}

/// SIGTERM the child's process group, escalating to SIGKILL after the grace
/// period if it has not exited.
async fn terminate(child: &mut Child, pid: i32) -> Result<()> {
    signal_group(pid, libc::SIGTERM);
    match tokio::time::timeout(TERM_GRACE, child.wait()).await {
        Ok(status) => {
            status?;
        }
        Err(_) => {
            tracing::warn!(pid, "application ignored SIGTERM, escalating to SIGKILL");
            signal_group(pid, libc::SIGKILL);
            child.wait().await?;
        }
    }
    Ok(())
}

/// Send a signal to the child's process group. The group id equals the
/// child's pid because the child called setsid() at spawn.
fn signal_group(pid: i32, signal: i32) {
    // SAFETY: kill with a negative pid only delivers a signal to the group.
    unsafe {
        libc::kill(-pid, signal);
    }
}

/// Move this process into its own process group and session.
///
/// Failures are tolerated: the daemon may already be a group or session
/// leader, in which case the calls are redundant.
fn detach_session() {
    // SAFETY: plain syscall wrappers with no pointer arguments.
    unsafe {
        libc::setpgid(0, 0);
        libc::setsid();
    }
}

/// Map an OS exit status onto the supervised outcome.
fn outcome_of(status: ExitStatus) -> ExitOutcome {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitOutcome::Killed(signal);
        }
    }
    ExitOutcome::Exited(status.code().unwrap_or(-1))
}

/// Forward one raw chunk of child output. No line buffering, no
/// transformation.
async fn forward<W: AsyncWrite + Unpin>(chunk: &[u8], sink: &mut W) -> Result<()> {
    sink.write_all(chunk).await?;
    sink.flush().await?;
    Ok(())
}

/// Forward whatever is still buffered in a pipe after the child terminated,
/// bounded by `DRAIN_TIMEOUT` so an inherited write end cannot wedge
/// shutdown.
async fn flush_remaining<R, W>(reader: &mut R, open: bool, sink: &mut W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !open {
        return;
    }
    let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if sink.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sink.flush().await;
    })
    .await;
}
