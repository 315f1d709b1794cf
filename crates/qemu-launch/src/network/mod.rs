mod mac;
mod port;

pub use mac::MacAddress;
pub use port::{PORT_WINDOW, find_local_port};

/// First port probed for the guest serial console.
pub const SERIAL_START_PORT: u16 = 8990;

/// First port probed for the SSH host-forward.
pub const SSH_START_PORT: u16 = 2222;

/// Fixed host/guest port forwarded when GDB is enabled.
pub const GDB_PORT: u16 = 2159;
