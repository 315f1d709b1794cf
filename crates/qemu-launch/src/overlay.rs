use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{LaunchError, Result};

/// Keep a private copy of `source` at `sidecar` for an overlay.
///
/// The copy happens only while the overlay itself has not been created:
/// once it exists the sidecar is what it was built against and the base
/// artifact is no longer consulted. An existing sidecar is never
/// overwritten. In dry-run mode the `cp` command is printed instead, and a
/// missing source is only reported.
///
/// Returns the sidecar path, which becomes the effective artifact.
pub(crate) fn prepare_sidecar(
    label: &'static str,
    source: &Path,
    sidecar: PathBuf,
    overlay: &Path,
    dry_run: bool,
) -> Result<PathBuf> {
    if overlay.exists() {
        debug!(
            overlay = %overlay.display(),
            sidecar = %sidecar.display(),
            "overlay exists, reusing {label}"
        );
        return Ok(sidecar);
    }

    if !source.exists() {
        if !dry_run {
            return Err(LaunchError::MissingArtifact {
                label,
                path: source.to_path_buf(),
            });
        }
        warn!(path = %source.display(), "{label} missing (dry run)");
    }

    if sidecar.exists() {
        debug!(sidecar = %sidecar.display(), "{label} sidecar already present");
    } else if dry_run {
        println!("cp {} {}", source.display(), sidecar.display());
    } else {
        std::fs::copy(source, &sidecar).map_err(|e| LaunchError::Copy {
            from: source.to_path_buf(),
            to: sidecar.clone(),
            source: e,
        })?;
        info!(from = %source.display(), to = %sidecar.display(), "copied {label} for overlay");
    }

    Ok(sidecar)
}

/// Final gate on an effective artifact path.
///
/// A dry run may reference files that were never materialized, unless the
/// overlay already exists: then the sidecars are expected to be on disk.
pub(crate) fn ensure_exists(
    label: &'static str,
    path: &Path,
    overlay: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let overlay_exists = overlay.is_some_and(Path::exists);
    if !path.exists() && (!dry_run || overlay_exists) {
        return Err(LaunchError::MissingArtifact {
            label,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
