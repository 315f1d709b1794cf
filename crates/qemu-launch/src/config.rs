use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{LaunchError, Result};
use crate::kvm::{KvmOk, KvmProbe};
use crate::machine::{BootImage, BootMode, DriveInterface, ExtensionTable, autodetect_machine};
use crate::network::{MacAddress, SERIAL_START_PORT, SSH_START_PORT, find_local_port};
use crate::options::{DEFAULT_MEMORY, RunOptions};
use crate::overlay::{ensure_exists, prepare_sidecar};
use crate::paths::{self, EFI_FIRMWARE, ImagesPaths, OverlayPaths};

const UBOOT_LABEL: &str = "U-Boot image";
const KERNEL_LABEL: &str = "kernel image";
const IMAGE_LABEL: &str = "OS image";

/// Fully resolved description of one QEMU launch.
///
/// Built once from [`RunOptions`]; construction either succeeds completely
/// or fails, and the result is not modified afterwards.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    machine: String,
    boot_mode: BootMode,
    boot_image: BootImage,
    image: PathBuf,
    overlay: Option<PathBuf>,
    drive_interface: DriveInterface,
    mac: MacAddress,
    /// Present only when the secondary network is enabled.
    secondary_mac: Option<MacAddress>,
    serial_port: u16,
    ssh_port: u16,
    mem: String,
    kvm: bool,
    gui: bool,
    gdb: bool,
    pcap: Option<PathBuf>,
    host_forward: Option<String>,
}

impl LaunchConfig {
    /// Resolve `options`, probing the host for KVM with `kvm-ok` if needed.
    pub fn new(options: &RunOptions) -> Result<Self> {
        Self::resolve(options, &KvmOk)
    }

    /// Resolve `options` against the images directory.
    ///
    /// May copy the U-Boot ROM and disk image next to a new overlay; a dry
    /// run prints those copies instead.
    pub fn resolve(options: &RunOptions, kvm_probe: &dyn KvmProbe) -> Result<Self> {
        let boot_mode = BootMode::select(options.efi, options.uboot);
        if !options.uboot && options.overlay.is_some() {
            return Err(LaunchError::Config(
                "an overlay is only supported with the U-Boot loader".into(),
            ));
        }
        let extensions = ExtensionTable::for_uboot(options.uboot);

        let machine = options
            .machine
            .clone()
            .resolve_with(|| autodetect_machine(&options.dir))?;
        let images = ImagesPaths::new(&options.dir, &machine);

        let boot_image = match boot_mode {
            BootMode::Efi => BootImage::Bios(PathBuf::from(EFI_FIRMWARE)),
            BootMode::Uboot => BootImage::Bios(resolve_bootloader(options, &images)?),
            BootMode::DirectKernel => {
                let kernel = paths::resolve(&images.kernel())?;
                ensure_exists(KERNEL_LABEL, &kernel, None, options.dry_run)?;
                BootImage::Kernel(kernel)
            }
        };

        let image = resolve_image(options, &images, &extensions)?;

        let mac = options
            .mac
            .clone()
            .resolve_with(|| Ok::<_, LaunchError>(MacAddress::random()))?;
        let secondary_mac = options
            .secondary_network
            .then(|| MacAddress::random_distinct_from(&mac));
        let serial_port = find_local_port(SERIAL_START_PORT)?;
        let ssh_port = find_local_port(SSH_START_PORT)?;
        let kvm = options
            .kvm
            .clone()
            .resolve_with(|| Ok::<_, LaunchError>(kvm_probe.kvm_available()))?;

        let config = Self {
            machine,
            boot_mode,
            boot_image,
            image,
            overlay: options.overlay.clone(),
            drive_interface: DriveInterface::for_uboot(options.uboot),
            mac,
            secondary_mac,
            serial_port,
            ssh_port,
            mem: non_empty(&options.mem).unwrap_or(DEFAULT_MEMORY).to_string(),
            kvm,
            gui: !options.no_gui,
            gdb: options.gdb,
            pcap: options.pcap.clone(),
            host_forward: non_empty(&options.host_forward).map(str::to_string),
        };

        info!(
            machine = %config.machine,
            boot_mode = %config.boot_mode,
            boot_image = %config.boot_image.path().display(),
            image = %config.image.display(),
            overlay = ?config.overlay,
            serial_port = config.serial_port,
            ssh_port = config.ssh_port,
            kvm = config.kvm,
            "resolved launch configuration"
        );
        Ok(config)
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    pub fn boot_mode(&self) -> BootMode {
        self.boot_mode
    }

    pub fn boot_image(&self) -> &BootImage {
        &self.boot_image
    }

    /// Disk image QEMU boots from: the overlay's image sidecar when an
    /// overlay is active.
    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn overlay(&self) -> Option<&Path> {
        self.overlay.as_deref()
    }

    /// `true` when an overlay is requested but its qcow2 file has not been
    /// created yet; the caller should run
    /// [`img_command_line`](Self::img_command_line) first.
    pub fn needs_overlay_image(&self) -> bool {
        self.overlay.as_deref().is_some_and(|p| !p.exists())
    }

    pub fn drive_interface(&self) -> DriveInterface {
        self.drive_interface
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn secondary_mac(&self) -> Option<MacAddress> {
        self.secondary_mac
    }

    pub fn secondary_network(&self) -> bool {
        self.secondary_mac.is_some()
    }

    pub fn serial_port(&self) -> u16 {
        self.serial_port
    }

    pub fn ssh_port(&self) -> u16 {
        self.ssh_port
    }

    pub fn mem(&self) -> &str {
        &self.mem
    }

    pub fn kvm(&self) -> bool {
        self.kvm
    }

    pub fn gui(&self) -> bool {
        self.gui
    }

    pub fn gdb(&self) -> bool {
        self.gdb
    }

    pub fn pcap(&self) -> Option<&Path> {
        self.pcap.as_deref()
    }

    pub fn host_forward(&self) -> Option<&str> {
        self.host_forward.as_deref()
    }
}

/// An empty string counts as unset.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// U-Boot ROM, redirected to the overlay's private copy when an overlay is
/// used.
fn resolve_bootloader(options: &RunOptions, images: &ImagesPaths) -> Result<PathBuf> {
    let rom = match &options.bootloader {
        Some(path) => path.clone(),
        None => std::path::absolute(images.bootloader())?,
    };

    let rom = match options.overlay.as_deref() {
        Some(overlay) => prepare_sidecar(
            UBOOT_LABEL,
            &rom,
            OverlayPaths::new(overlay.to_path_buf()).rom(),
            overlay,
            options.dry_run,
        )?,
        None => rom,
    };

    ensure_exists(UBOOT_LABEL, &rom, options.overlay.as_deref(), options.dry_run)?;
    Ok(rom)
}

/// Base disk image, redirected to the overlay's private copy when an
/// overlay is used.
///
/// `image_name` naming an existing file is used as-is; otherwise the
/// deploy-directory name is built from the machine's extension.
fn resolve_image(
    options: &RunOptions,
    images: &ImagesPaths,
    extensions: &ExtensionTable,
) -> Result<PathBuf> {
    let given = Path::new(&options.image_name);
    let base = if given.exists() {
        given.canonicalize()?
    } else {
        images.image(&options.image_name, extensions.extension(images.machine()))
    };

    let image = match options.overlay.as_deref() {
        Some(overlay) => prepare_sidecar(
            IMAGE_LABEL,
            &base,
            OverlayPaths::new(overlay.to_path_buf()).img(),
            overlay,
            options.dry_run,
        )?,
        None => paths::resolve(&base)?,
    };

    ensure_exists(IMAGE_LABEL, &image, options.overlay.as_deref(), options.dry_run)?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvm::FixedKvm;
    use crate::options::Choice;

    /// `<dir>/qemux86-64/` with a U-Boot ROM, kernel and both root
    /// filesystem flavours.
    fn deploy_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let machine = dir.path().join("qemux86-64");
        std::fs::create_dir(&machine).unwrap();
        for (name, content) in [
            ("u-boot-qemux86-64.rom", "rom"),
            ("bzImage-qemux86-64.bin", "kernel"),
            ("core-image-minimal-qemux86-64.ota-ext4", "ota"),
            ("core-image-minimal-qemux86-64.ext4", "ext4"),
        ] {
            std::fs::write(machine.join(name), content).unwrap();
        }
        dir
    }

    fn options(dir: &Path) -> RunOptions {
        RunOptions {
            dir: dir.to_path_buf(),
            kvm: Choice::Explicit(false),
            ..RunOptions::default()
        }
    }

    #[test]
    fn overlay_with_direct_kernel_is_rejected() {
        let dir = deploy_dir();
        for dry_run in [false, true] {
            let opts = RunOptions {
                uboot: false,
                overlay: Some(dir.path().join("foo.img")),
                dry_run,
                machine: Choice::Explicit("anything".into()),
                ..options(dir.path())
            };
            let err = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap_err();
            assert!(matches!(err, LaunchError::Config(ref m) if m.contains("U-Boot")));
        }
        assert!(!dir.path().join("foo.img.img").exists());
    }

    #[test]
    fn autodetects_machine_from_single_entry() {
        let dir = deploy_dir();
        let config = LaunchConfig::resolve(&options(dir.path()), &FixedKvm(false)).unwrap();
        assert_eq!(config.machine(), "qemux86-64");
    }

    #[test]
    fn efi_uses_ovmf_firmware() {
        let dir = deploy_dir();
        let opts = RunOptions {
            efi: true,
            ..options(dir.path())
        };
        let config = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap();
        assert_eq!(config.boot_mode(), BootMode::Efi);
        assert_eq!(config.boot_image(), &BootImage::Bios(PathBuf::from("OVMF.fd")));
        assert_eq!(config.drive_interface(), DriveInterface::Ide);
    }

    #[test]
    fn efi_with_uboot_disabled_rejects_overlay() {
        let dir = deploy_dir();
        let opts = RunOptions {
            efi: true,
            uboot: false,
            overlay: Some(dir.path().join("foo.img")),
            machine: Choice::Explicit("qemux86-64".into()),
            ..options(dir.path())
        };
        let err = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap_err();
        assert!(matches!(err, LaunchError::Config(ref m) if m.contains("U-Boot")));
        assert!(!dir.path().join("foo.img.img").exists());
        assert!(!dir.path().join("foo.img.u-boot.rom").exists());
    }

    #[test]
    fn efi_with_uboot_disabled_boots_ovmf_from_ext4_on_virtio() {
        let dir = deploy_dir();
        let opts = RunOptions {
            efi: true,
            uboot: false,
            ..options(dir.path())
        };
        let config = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap();
        let machine = dir.path().join("qemux86-64").canonicalize().unwrap();
        assert_eq!(config.boot_mode(), BootMode::Efi);
        assert_eq!(config.boot_image(), &BootImage::Bios(PathBuf::from("OVMF.fd")));
        assert_eq!(config.image(), machine.join("core-image-minimal-qemux86-64.ext4"));
        assert_eq!(config.drive_interface(), DriveInterface::Virtio);
    }

    #[test]
    fn empty_memory_and_host_forward_count_as_unset() {
        let dir = deploy_dir();
        let opts = RunOptions {
            mem: Some(String::new()),
            host_forward: Some(String::new()),
            ..options(dir.path())
        };
        let config = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap();
        assert_eq!(config.mem(), "1G");
        assert_eq!(config.host_forward(), None);
    }

    #[test]
    fn direct_kernel_uses_ext4_and_virtio() {
        let dir = deploy_dir();
        let opts = RunOptions {
            uboot: false,
            ..options(dir.path())
        };
        let config = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap();
        let machine = dir.path().join("qemux86-64").canonicalize().unwrap();
        assert_eq!(
            config.boot_image(),
            &BootImage::Kernel(machine.join("bzImage-qemux86-64.bin"))
        );
        assert_eq!(config.image(), machine.join("core-image-minimal-qemux86-64.ext4"));
        assert_eq!(config.drive_interface(), DriveInterface::Virtio);
    }

    #[test]
    fn bootloader_override_is_used() {
        let dir = deploy_dir();
        let rom = dir.path().join("custom.rom");
        std::fs::write(&rom, "custom").unwrap();
        let opts = RunOptions {
            machine: Choice::Explicit("qemux86-64".into()),
            bootloader: Some(rom.clone()),
            ..options(dir.path())
        };
        let config = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap();
        assert_eq!(config.boot_image(), &BootImage::Bios(rom));
    }

    #[test]
    fn missing_rom_fails_outside_dry_run() {
        let dir = deploy_dir();
        std::fs::remove_file(dir.path().join("qemux86-64/u-boot-qemux86-64.rom")).unwrap();
        let err = LaunchConfig::resolve(&options(dir.path()), &FixedKvm(false)).unwrap_err();
        assert!(matches!(err, LaunchError::MissingArtifact { label: UBOOT_LABEL, .. }));
    }

    #[test]
    fn missing_image_fails_outside_dry_run() {
        let dir = deploy_dir();
        let opts = RunOptions {
            image_name: "core-image-full".into(),
            ..options(dir.path())
        };
        let err = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap_err();
        assert!(matches!(err, LaunchError::MissingArtifact { label: IMAGE_LABEL, .. }));
    }

    #[test]
    fn image_name_may_be_a_path() {
        let dir = deploy_dir();
        let custom = dir.path().join("custom.wic");
        std::fs::write(&custom, "disk").unwrap();
        let opts = RunOptions {
            machine: Choice::Explicit("qemux86-64".into()),
            image_name: custom.to_string_lossy().into_owned(),
            ..options(dir.path())
        };
        let config = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap();
        assert_eq!(config.image(), custom.canonicalize().unwrap());
    }

    #[test]
    fn kvm_autodetect_uses_probe() {
        let dir = deploy_dir();
        let opts = RunOptions {
            kvm: Choice::Autodetect,
            ..options(dir.path())
        };
        assert!(LaunchConfig::resolve(&opts, &FixedKvm(true)).unwrap().kvm());
        assert!(!LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap().kvm());
    }

    #[test]
    fn explicit_kvm_overrides_probe() {
        let dir = deploy_dir();
        let opts = RunOptions {
            kvm: Choice::Explicit(true),
            ..options(dir.path())
        };
        assert!(LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap().kvm());
    }

    #[test]
    fn defaults_and_pass_through_fields() {
        let dir = deploy_dir();
        let mac = MacAddress::new([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
        let opts = RunOptions {
            mac: Choice::Explicit(mac),
            no_gui: true,
            gdb: true,
            pcap: Some(PathBuf::from("/tmp/net.pcap")),
            host_forward: Some("tcp:0.0.0.0:8080-:80".into()),
            ..options(dir.path())
        };
        let config = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap();
        assert_eq!(config.mem(), "1G");
        assert_eq!(config.mac(), mac);
        assert!(!config.gui());
        assert!(config.gdb());
        assert_eq!(config.pcap(), Some(Path::new("/tmp/net.pcap")));
        assert_eq!(config.host_forward(), Some("tcp:0.0.0.0:8080-:80"));
        assert!(!config.secondary_network());
        assert_eq!(config.secondary_mac(), None);
    }

    #[test]
    fn random_mac_and_distinct_secondary() {
        let dir = deploy_dir();
        let opts = RunOptions {
            secondary_network: true,
            ..options(dir.path())
        };
        let config = LaunchConfig::resolve(&opts, &FixedKvm(false)).unwrap();
        assert_eq!(&config.mac().octets()[..2], &[0xca_u8, 0xfe]);
        let secondary = config.secondary_mac().unwrap();
        assert_ne!(secondary, config.mac());
    }

    #[test]
    fn ports_are_distinct_and_in_window() {
        let dir = deploy_dir();
        let config = LaunchConfig::resolve(&options(dir.path()), &FixedKvm(false)).unwrap();
        assert_ne!(config.serial_port(), config.ssh_port());
        assert!((SERIAL_START_PORT..SERIAL_START_PORT + 10).contains(&config.serial_port()));
        assert!((SSH_START_PORT..SSH_START_PORT + 10).contains(&config.ssh_port()));
    }
}
