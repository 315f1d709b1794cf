use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{LaunchError, Result};

/// Machine whose root filesystem extension depends on the boot mode.
const QEMUX86_64: &str = "qemux86-64";

/// Extension used for machines missing from the table.
const DEFAULT_EXTENSION: &str = "wic";

/// Image extension per machine, as produced by the OTA build.
const BASE_EXTENSIONS: &[(&str, &str)] = &[("intel-corei7-64", "wic"), (QEMUX86_64, "ota-ext4")];

/// How the emulated machine is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// U-Boot ROM passed as `-bios`.
    Uboot,
    /// OVMF firmware passed as `-bios`.
    Efi,
    /// Kernel passed with `-kernel`, root filesystem on virtio.
    DirectKernel,
}

impl BootMode {
    /// EFI wins over everything; otherwise U-Boot unless it was disabled.
    pub fn select(efi: bool, uboot: bool) -> Self {
        if efi {
            Self::Efi
        } else if uboot {
            Self::Uboot
        } else {
            Self::DirectKernel
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uboot => "uboot",
            Self::Efi => "efi",
            Self::DirectKernel => "direct-kernel",
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Firmware or kernel handed to QEMU. Exactly one is used per launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootImage {
    Bios(PathBuf),
    Kernel(PathBuf),
}

impl BootImage {
    pub fn path(&self) -> &Path {
        match self {
            Self::Bios(p) | Self::Kernel(p) => p,
        }
    }
}

/// `if=` value of the `-drive` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveInterface {
    Ide,
    Virtio,
}

impl DriveInterface {
    /// IDE behind U-Boot; the kernel's own virtio driver otherwise.
    pub fn for_uboot(uboot: bool) -> Self {
        if uboot { Self::Ide } else { Self::Virtio }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ide => "ide",
            Self::Virtio => "virtio",
        }
    }
}

impl fmt::Display for DriveInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine → disk image extension for a single launch.
///
/// Built from the fixed base table plus the U-Boot override; never shared
/// between launches.
#[derive(Debug, Clone)]
pub struct ExtensionTable {
    entries: HashMap<&'static str, &'static str>,
}

impl ExtensionTable {
    pub fn for_uboot(uboot: bool) -> Self {
        let mut entries: HashMap<_, _> = BASE_EXTENSIONS.iter().copied().collect();
        // Without U-Boot the plain ext4 root filesystem is booted.
        if !uboot {
            entries.insert(QEMUX86_64, "ext4");
        }
        Self { entries }
    }

    pub fn extension(&self, machine: &str) -> &'static str {
        self.entries
            .get(machine)
            .copied()
            .unwrap_or(DEFAULT_EXTENSION)
    }
}

/// The machine name is the single entry of the images directory.
pub(crate) fn autodetect_machine(dir: &Path) -> Result<String> {
    if !dir.is_dir() {
        return Err(LaunchError::Config(format!(
            "directory {} does not exist, please specify a machine or a valid images directory",
            dir.display()
        )));
    }

    let entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<std::io::Result<Vec<_>>>()?;

    let [name] = <[_; 1]>::try_from(entries).map_err(|_| {
        LaunchError::Config(format!(
            "could not autodetect machine type: expected exactly one entry in {}, \
             maybe machine qemux86-64?",
            dir.display()
        ))
    })?;
    name.into_string().map_err(|name| {
        LaunchError::Config(format!("machine directory name is not UTF-8: {name:?}"))
    })
}
