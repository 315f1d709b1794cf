use std::net::{Ipv4Addr, TcpListener};

use tracing::{debug, warn};

use crate::error::{LaunchError, Result};

/// Number of consecutive ports probed before giving up.
pub const PORT_WINDOW: u16 = 10;

/// Find the first free TCP port in `start..start + PORT_WINDOW`.
///
/// Each candidate is bound on all interfaces and released immediately, so
/// nothing is reserved: another process may still take the port before
/// QEMU binds it.
pub fn find_local_port(start: u16) -> Result<u16> {
    probe_window(start, |port| {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    })
}

/// The window stops early at the top of the port range.
fn probe_window(start: u16, mut is_free: impl FnMut(u16) -> bool) -> Result<u16> {
    for port in (0..PORT_WINDOW).map_while(|i| start.checked_add(i)) {
        if is_free(port) {
            return Ok(port);
        }
        debug!(port, "skipping port");
    }
    let end = start.saturating_add(PORT_WINDOW);
    warn!(start, end, "no free TCP port in window");
    Err(LaunchError::PortExhausted { start, end })
}
