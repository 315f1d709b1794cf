use std::process::{Command, Stdio};

use tracing::debug;

/// Program whose zero exit status means KVM acceleration can be used.
pub const KVM_PROBE_PROGRAM: &str = "kvm-ok";

/// Detects whether hardware virtualization is available on the host.
///
/// Abstracted as a trait so tests can inject a fixed answer instead of
/// depending on the build host.
pub trait KvmProbe {
    fn kvm_available(&self) -> bool;
}

/// Host probe: runs `kvm-ok` (from cpu-checker).
///
/// A missing program, a spawn failure, or a nonzero exit all count as
/// "unavailable".
pub struct KvmOk;

impl KvmProbe for KvmOk {
    fn kvm_available(&self) -> bool {
        probe_succeeds(KVM_PROBE_PROGRAM)
    }
}

/// Run `program` from `PATH`; only a zero exit status counts as success.
fn probe_succeeds(program: &str) -> bool {
    let path = match which::which(program) {
        Ok(path) => path,
        Err(e) => {
            debug!(error = %e, "{program} not found, assuming no KVM");
            return false;
        }
    };

    match Command::new(&path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => true,
        Ok(status) => {
            debug!(%status, "{program} reported no KVM");
            false
        }
        Err(e) => {
            debug!(error = %e, "{program} failed to spawn, assuming no KVM");
            false
        }
    }
}

/// Fixed answer, for tests and for callers that already know.
#[derive(Debug, Clone, Copy)]
pub struct FixedKvm(pub bool);

impl KvmProbe for FixedKvm {
    fn kvm_available(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_probe_returns_value() {
        assert!(FixedKvm(true).kvm_available());
        assert!(!FixedKvm(false).kvm_available());
    }

    #[test]
    fn missing_program_means_unavailable() {
        assert!(!probe_succeeds("kvm-ok-not-installed-anywhere"));
    }

    #[test]
    fn nonzero_exit_means_unavailable() {
        assert!(!probe_succeeds("false"));
    }

    #[test]
    fn zero_exit_means_available() {
        assert!(probe_succeeds("true"));
    }
}
