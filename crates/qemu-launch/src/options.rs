use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LaunchError, Result};
use crate::network::MacAddress;

pub(crate) const DEFAULT_IMAGES_DIR: &str = "tmp/deploy/images";
pub(crate) const DEFAULT_IMAGE_NAME: &str = "core-image-minimal";
pub(crate) const DEFAULT_MEMORY: &str = "1G";

/// A value the caller either pins or leaves to detection.
///
/// In YAML an absent or `null` field is `Autodetect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<T>", into = "Option<T>")]
#[serde(bound(
    serialize = "T: Serialize + Clone",
    deserialize = "T: Deserialize<'de>"
))]
pub enum Choice<T> {
    Explicit(T),
    Autodetect,
}

impl<T> Choice<T> {
    pub fn explicit(&self) -> Option<&T> {
        match self {
            Self::Explicit(v) => Some(v),
            Self::Autodetect => None,
        }
    }

    /// Use the pinned value, or run `detect`.
    pub fn resolve_with<E>(
        self,
        detect: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        match self {
            Self::Explicit(v) => Ok(v),
            Self::Autodetect => detect(),
        }
    }
}

impl<T> From<Option<T>> for Choice<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Autodetect, Self::Explicit)
    }
}

impl<T> From<Choice<T>> for Option<T> {
    fn from(value: Choice<T>) -> Self {
        match value {
            Choice::Explicit(v) => Some(v),
            Choice::Autodetect => None,
        }
    }
}

/// Everything the caller decided about one QEMU launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Machine name; autodetected from the single entry of `dir`.
    pub machine: Choice<String>,
    /// Bitbake deploy directory: `<dir>/<machine>/...`.
    pub dir: PathBuf,
    /// Image recipe name, or a path to an existing disk image.
    pub image_name: String,
    /// Boot OVMF instead of U-Boot.
    pub efi: bool,
    /// Boot through U-Boot. When false the kernel is booted directly.
    pub uboot: bool,
    /// U-Boot ROM to use instead of the one in the deploy directory.
    pub bootloader: Option<PathBuf>,
    /// Copy-on-write overlay; the base image and ROM are copied next to it.
    pub overlay: Option<PathBuf>,
    /// QEMU `-m` value. Defaults to `1G`.
    pub mem: Option<String>,
    pub mac: Choice<MacAddress>,
    /// Force KVM on or off; autodetected with `kvm-ok` otherwise.
    pub kvm: Choice<bool>,
    pub no_gui: bool,
    /// Forward the GDB port into the guest.
    pub gdb: bool,
    /// Dump guest network traffic to this file.
    pub pcap: Option<PathBuf>,
    /// Attach a second NIC on a multicast socket network.
    pub secondary_network: bool,
    /// Extra `hostfwd=` rule, e.g. `tcp:0.0.0.0:8080-:80`.
    pub host_forward: Option<String>,
    /// Print sidecar copies instead of performing them.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            machine: Choice::Autodetect,
            dir: PathBuf::from(DEFAULT_IMAGES_DIR),
            image_name: DEFAULT_IMAGE_NAME.to_string(),
            efi: false,
            uboot: true,
            bootloader: None,
            overlay: None,
            mem: None,
            mac: Choice::Autodetect,
            kvm: Choice::Autodetect,
            no_gui: false,
            gdb: false,
            pcap: None,
            secondary_network: false,
            host_forward: None,
            dry_run: false,
        }
    }
}

impl RunOptions {
    /// Load run options from a YAML file.
    ///
    /// Relative paths are resolved against the file's parent directory.
    /// `image_name` is left alone since it is usually a recipe name.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LaunchError::Config(format!("read {}: {e}", path.display())))?;
        let mut options: RunOptions = serde_yaml_ng::from_str(&content)
            .map_err(|e| LaunchError::Config(format!("parse {}: {e}", path.display())))?;
        if let Some(config_dir) = path.parent() {
            options.resolve_relative_paths(config_dir);
        }
        Ok(options)
    }

    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = config_dir.join(&*p);
            }
        };
        resolve(&mut self.dir);
        if let Some(p) = &mut self.bootloader {
            resolve(p);
        }
        if let Some(p) = &mut self.overlay {
            resolve(p);
        }
        if let Some(p) = &mut self.pcap {
            resolve(p);
        }
    }
}
