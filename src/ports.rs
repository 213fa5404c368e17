//! Debug-port discovery.
//!
//! Debug connectivity needs TCP ports that are free on the target at launch
//! time. The caller supplies a candidate set (ports and inclusive ranges) and
//! [`PortList::find_free_port`] scans it with throwaway listeners. The probe
//! listener is released as soon as the port number is read back, so there is
//! a window between discovery and the child's own bind; the window is an
//! accepted limitation of this scheme, not something this module tries to
//! close.

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use crate::error::{AppError, Result};

/// Ordered, lazily consumed set of candidate TCP ports.
///
/// Candidates are consumed exactly once and never revisited: repeated
/// discovery calls on the same list keep advancing through the sequence, so
/// two allocations in one invocation cannot return the same port.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortList {
    /// Remaining candidates as inclusive (low, high) ranges.
    ranges: Vec<(u16, u16)>,
}

impl PortList {
    /// Parse a candidate specifier: comma-separated ports and inclusive
    /// ranges, e.g. `"10000-10019"` or `"5039,10000-10010"`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPortRange` for empty specifiers, non-numeric ports,
    /// port 0, or ranges with low > high.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut ranges = Vec::new();

        for part in spec.split(',') {
            let part = part.trim();
            let (low, high) = match part.split_once('-') {
                Some((low, high)) => (parse_port(low, spec)?, parse_port(high, spec)?),
                None => {
                    let port = parse_port(part, spec)?;
                    (port, port)
                }
            };
            if low > high {
                return Err(AppError::InvalidPortRange(spec.to_string()));
            }
            ranges.push((low, high));
        }

        Ok(Self { ranges })
    }

    /// Whether any candidates remain.
    pub fn has_more(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Take the next candidate, consuming it.
    pub fn next(&mut self) -> Option<u16> {
        let (low, high) = *self.ranges.first()?;
        if low == high {
            self.ranges.remove(0);
        } else {
            self.ranges[0].0 = low + 1;
        }
        Some(low)
    }

    /// Find the first candidate that can be bound and listened on right now.
    ///
    /// Returns `None` once the candidate set is exhausted, which is fatal for
    /// any launch mode that requires a port.
    pub fn find_free_port(&mut self) -> Option<u16> {
        while let Some(port) = self.next() {
            let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
            if let Ok(listener) = TcpListener::bind(addr)
                && let Ok(local) = listener.local_addr()
            {
                return Some(local.port());
            }
        }
        None
    }
}

fn parse_port(text: &str, spec: &str) -> Result<u16> {
    match text.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(AppError::InvalidPortRange(spec.to_string())),
        Ok(port) => Ok(port),
    }
}
