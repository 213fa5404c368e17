//! Control channel: singleton enforcement and the stop protocol.
//!
//! One abstract-namespace Unix socket is the process-wide rendezvous
//! endpoint. Holding its listening end is the mutual-exclusion invariant: at
//! most one supervisor per device may listen on the well-known name, and the
//! kernel releases the name automatically when the holder exits, on every
//! exit path.
//!
//! ## Stop protocol
//!
//! A bare inbound connection is the entire protocol. No payload is required
//! and any data sent is ignored; the server treats connection establishment
//! itself as the stop request.
//!
//! A stop that arrives before the supervisor starts accepting sits in the
//! listen backlog and is delivered on the first accept, so a stop racing a
//! starting child is queued rather than lost.

use std::io;
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{
    SocketAddr, UnixListener as StdUnixListener, UnixStream as StdUnixStream,
};
use std::time::Duration;

use tokio::net::UnixListener;

use crate::error::{AppError, Result};

/// Well-known endpoint name for the device's supervisor instance.
pub const CONTROL_SOCKET_NAME: &str = "appcontrollerd";

/// Delay between singleton-acquisition attempts.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Acquisition attempts before giving up on a wedged holder.
const RETRY_ATTEMPTS: u32 = 20;

/// Handle to the well-known control endpoint.
///
/// The endpoint name is injectable so tests can rendezvous on unique names
/// without interfering with a live instance.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    name: String,
}

impl ControlChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn addr(&self) -> io::Result<SocketAddr> {
        SocketAddr::from_abstract_name(self.name.as_bytes())
    }

    /// Try to become the singleton server.
    ///
    /// Returns `Ok(Some(listener))` when the endpoint was acquired,
    /// `Ok(None)` when another instance already holds it, and `Err` for
    /// anything else.
    pub fn try_bind(&self) -> Result<Option<ControlListener>> {
        match StdUnixListener::bind_addr(&self.addr()?) {
            Ok(listener) => {
                // The fd is created close-on-exec, so the supervised child
                // can never inherit the endpoint and outlive the singleton
                // invariant.
                listener.set_nonblocking(true)?;
                Ok(Some(ControlListener {
                    inner: UnixListener::from_std(listener)?,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Wake the current holder of the endpoint, best effort.
    ///
    /// Connection establishment is the signal; the stream is closed
    /// immediately. A missing server is not an error.
    pub fn signal_stop(&self) {
        match self.addr().and_then(|addr| StdUnixStream::connect_addr(&addr)) {
            Ok(stream) => drop(stream),
            Err(e) => tracing::debug!("stop signal not delivered: {}", e),
        }
    }

    /// Acquire the endpoint, displacing a previous instance if necessary.
    ///
    /// On AddressInUse the existing holder is signalled to stop, then the
    /// bind is retried after a short delay. The retry budget is bounded: a
    /// wedged holder that never releases the endpoint is a fatal startup
    /// error, not something to wait out indefinitely.
    pub async fn acquire(&self) -> Result<ControlListener> {
        for attempt in 1..=RETRY_ATTEMPTS {
            if let Some(listener) = self.try_bind()? {
                return Ok(listener);
            }
            tracing::info!(attempt, "control endpoint busy, signalling previous instance");
            self.signal_stop();
            tokio::time::sleep(RETRY_DELAY).await;
        }
        Err(AppError::ControlChannelBusy)
    }
}

/// The listening side of the control channel, held by the active supervisor
/// for its whole lifetime.
pub struct ControlListener {
    inner: UnixListener,
}

impl ControlListener {
    /// Wait for the next stop request.
    ///
    /// Any inbound connection counts; the stream is dropped without reading.
    pub async fn stop_requested(&self) {
        loop {
            match self.inner.accept().await {
                Ok((stream, _addr)) => {
                    drop(stream);
                    return;
                }
                Err(e) => {
                    tracing::warn!("control endpoint accept failed: {}", e);
                    // Back off instead of spinning on a persistent failure.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}
