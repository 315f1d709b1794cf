//! Launch plan builder for running Yocto/OE build output under QEMU.
//!
//! [`LaunchConfig`] resolves a sparse [`RunOptions`] record against an images
//! directory (machine autodetection, bootloader or kernel selection, overlay
//! sidecars, ports, MAC, KVM) and then renders the `qemu-system-x86_64` and
//! `qemu-img` invocations as token lists.

mod command;
mod config;
mod error;
mod kvm;
mod machine;
mod network;
mod options;
mod overlay;
mod paths;

pub use command::{QEMU_BINARY, QEMU_IMG_BINARY, format_command_display};
pub use config::LaunchConfig;
pub use error::{LaunchError, Result};
pub use kvm::{FixedKvm, KvmOk, KvmProbe};
pub use machine::{BootImage, BootMode, DriveInterface, ExtensionTable};
pub use network::{
    GDB_PORT, MacAddress, PORT_WINDOW, SERIAL_START_PORT, SSH_START_PORT, find_local_port,
};
pub use options::{Choice, RunOptions};
pub use paths::{ImagesPaths, OverlayPaths};
