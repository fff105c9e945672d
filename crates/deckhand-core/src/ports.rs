// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Host port allocation for dashboard workers.
//!
//! Ports are never pre-allocated; every Create scans the pool from the
//! bottom and takes the first port that neither the OS nor the registry
//! holds. Freed ports are reused greedily, which keeps the scan
//! deterministic for a given snapshot.

use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default pool of host ports for dashboard workers.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 8051..=8100;

const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// The entire pool was scanned without finding an eligible port.
#[derive(Debug, Error)]
#[error("no free port in {start}..={end}")]
pub struct PortsExhausted {
    /// First port of the scanned pool.
    pub start: u16,
    /// Last port of the scanned pool.
    pub end: u16,
}

/// Probe reporting whether an OS-level listener occupies a port.
///
/// Injectable so tests can model OS occupancy without binding sockets.
pub type PortProbe = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Allocator over a fixed inclusive port range.
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    probe: PortProbe,
}

impl PortAllocator {
    /// Create an allocator with the default OS probe (TCP connect to
    /// localhost; a successful connect means the port is taken).
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self::with_probe(range, Arc::new(os_listener_present))
    }

    /// Create an allocator with a custom OS probe.
    pub fn with_probe(range: RangeInclusive<u16>, probe: PortProbe) -> Self {
        Self { range, probe }
    }

    /// Return the lowest port in the pool that is neither occupied by an
    /// OS listener nor present in `reserved`.
    ///
    /// `reserved` is the set of ports currently held by registry entries
    /// and provisional reservations. Exhaustion is permanent for this
    /// call; the allocator never retries internally.
    pub fn acquire(&self, reserved: &HashSet<u16>) -> Result<u16, PortsExhausted> {
        for port in self.range.clone() {
            if reserved.contains(&port) {
                continue;
            }
            if (self.probe)(port) {
                continue;
            }
            return Ok(port);
        }
        Err(PortsExhausted {
            start: *self.range.start(),
            end: *self.range.end(),
        })
    }
}

impl fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortAllocator")
            .field("range", &self.range)
            .finish_non_exhaustive()
    }
}

fn os_listener_present(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
}
