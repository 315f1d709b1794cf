use tracing::debug;

use crate::config::LaunchConfig;
use crate::machine::BootImage;
use crate::network::GDB_PORT;

pub const QEMU_BINARY: &str = "qemu-system-x86_64";
pub const QEMU_IMG_BINARY: &str = "qemu-img";

/// Kernel command line for direct-kernel boot (root on the virtio disk).
const KERNEL_APPEND: &str = "root=/dev/vda rw highres=off console=ttyS0 ip=dhcp";

/// Multicast socket network joined by the secondary NIC.
const SECONDARY_NETDEV: &str = "socket,id=vlan1,mcast=230.0.0.1:1234,localaddr=127.0.0.1";

/// Emulated CPU when KVM is not available.
const FALLBACK_CPU: &str = "Haswell";

/// Format a token list as one human-readable line.
pub fn format_command_display(args: &[String]) -> String {
    args.join(" ")
}

fn push(cmd: &mut Vec<String>, args: &[&str]) {
    cmd.extend(args.iter().map(|s| (*s).to_string()));
}

impl LaunchConfig {
    /// The `qemu-system-x86_64` invocation for this launch.
    pub fn command_line(&self) -> Vec<String> {
        let mut cmd = vec![QEMU_BINARY.to_string()];

        match self.boot_image() {
            BootImage::Bios(path) => {
                cmd.extend(["-bios".to_string(), path.display().to_string()]);
            }
            BootImage::Kernel(path) => {
                cmd.extend(["-kernel".to_string(), path.display().to_string()]);
            }
        }

        // With an overlay the qcow2 file is passed positionally at the end.
        if self.overlay().is_none() {
            cmd.push("-drive".to_string());
            cmd.push(format!(
                "file={},if={},format=raw,snapshot=on",
                self.image().display(),
                self.drive_interface()
            ));
        }

        cmd.push("-serial".to_string());
        cmd.push(format!("tcp:127.0.0.1:{},server,nowait", self.serial_port()));
        cmd.push("-m".to_string());
        cmd.push(self.mem().to_string());
        push(
            &mut cmd,
            &[
                "-object",
                "rng-random,id=rng0,filename=/dev/urandom",
                "-device",
                "virtio-rng-pci,rng=rng0",
            ],
        );

        cmd.push("-net".to_string());
        cmd.push(self.netuser());
        cmd.push("-net".to_string());
        cmd.push(format!("nic,macaddr={}", self.mac()));

        if let Some(pcap) = self.pcap() {
            cmd.push("-net".to_string());
            cmd.push(format!("dump,file={}", pcap.display()));
        }

        if let Some(mac) = self.secondary_mac() {
            push(&mut cmd, &["-netdev", SECONDARY_NETDEV, "-device"]);
            cmd.push(format!("e1000,netdev=vlan1,mac={mac}"));
        }

        if self.gui() {
            push(
                &mut cmd,
                &["-usb", "-device", "usb-tablet", "-show-cursor", "-vga", "std"],
            );
        } else {
            push(&mut cmd, &["-nographic", "-monitor", "null"]);
        }

        if self.kvm() {
            push(&mut cmd, &["-enable-kvm", "-cpu", "host"]);
        } else {
            push(&mut cmd, &["-cpu", FALLBACK_CPU]);
        }

        if let Some(overlay) = self.overlay() {
            cmd.push(overlay.display().to_string());
        }

        if matches!(self.boot_image(), BootImage::Kernel(_)) {
            push(&mut cmd, &["-append", KERNEL_APPEND]);
        }

        debug!(command = %format_command_display(&cmd), "qemu command line");
        cmd
    }

    /// The `qemu-img` invocation creating the overlay on top of the image.
    ///
    /// `None` when no overlay is configured. Run it only when
    /// [`needs_overlay_image`](Self::needs_overlay_image) is `true`: an
    /// existing overlay would be recreated empty.
    pub fn img_command_line(&self) -> Option<Vec<String>> {
        let overlay = self.overlay()?;
        let mut cmd = Vec::with_capacity(7);
        push(&mut cmd, &[QEMU_IMG_BINARY, "create", "-o"]);
        cmd.push(format!("backing_file={}", self.image().display()));
        push(&mut cmd, &["-f", "qcow2"]);
        cmd.push(overlay.display().to_string());
        Some(cmd)
    }

    /// User-mode network with the SSH forward plus optional GDB and extra
    /// forwards.
    fn netuser(&self) -> String {
        let mut netuser = format!(
            "user,hostfwd=tcp:0.0.0.0:{}-:22,restrict=off",
            self.ssh_port()
        );
        if self.gdb() {
            netuser.push_str(&format!(",hostfwd=tcp:0.0.0.0:{GDB_PORT}-:{GDB_PORT}"));
        }
        if let Some(fwd) = self.host_forward() {
            netuser.push_str(&format!(",hostfwd={fwd}"));
        }
        netuser
    }
}
