use std::path::{Path, PathBuf};

/// U-Boot ROM file name inside a machine's deploy directory.
pub const UBOOT_ROM: &str = "u-boot-qemux86-64.rom";

/// Kernel file name inside a machine's deploy directory.
pub const KERNEL_IMAGE: &str = "bzImage-qemux86-64.bin";

/// UEFI firmware, resolved by QEMU from its own data directory.
pub const EFI_FIRMWARE: &str = "OVMF.fd";

/// Conventional paths inside a bitbake deploy directory:
/// `<dir>/<machine>/...`.
pub struct ImagesPaths {
    machine_dir: PathBuf,
    machine: String,
}

impl ImagesPaths {
    pub fn new(dir: &Path, machine: &str) -> Self {
        Self {
            machine_dir: dir.join(machine),
            machine: machine.to_string(),
        }
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    pub fn bootloader(&self) -> PathBuf {
        self.machine_dir.join(UBOOT_ROM)
    }

    pub fn kernel(&self) -> PathBuf {
        self.machine_dir.join(KERNEL_IMAGE)
    }

    /// Disk image: `<imagename>-<machine>.<ext>`.
    pub fn image(&self, image_name: &str, ext: &str) -> PathBuf {
        self.machine_dir
            .join(format!("{image_name}-{}.{ext}", self.machine))
    }
}

/// Sidecar files kept next to an overlay so it survives bitbake cleaning
/// the deploy directory.
pub struct OverlayPaths {
    overlay: PathBuf,
}

impl OverlayPaths {
    pub fn new(overlay: PathBuf) -> Self {
        Self { overlay }
    }

    pub fn overlay(&self) -> &Path {
        &self.overlay
    }

    /// `<overlay>.u-boot.rom`
    pub fn rom(&self) -> PathBuf {
        self.with_suffix(".u-boot.rom")
    }

    /// `<overlay>.img`
    pub fn img(&self) -> PathBuf {
        self.with_suffix(".img")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.overlay.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Make `path` absolute, following symlinks when the file exists.
///
/// Paths that do not exist yet (dry runs) are made absolute lexically.
pub(crate) fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        path.canonicalize()
    } else {
        std::path::absolute(path)
    }
}
