//! Root filesystem transition
//!
//! Step helpers for moving the child phase into its container root. Ordering
//! matters and is owned by the caller ([`crate::executor::prepare_root`]):
//! chroot redefines every later path lookup, and the proc mount target is
//! relative, so the working directory must sit at the new `/` first.

use crate::{LaunchError, Result};
use nix::mount::{MntFlags, MsFlags};
use std::path::Path;

/// Hostname set inside the UTS namespace, invisible to the host.
pub const CONTAINER_HOSTNAME: &str = "container";

/// Set the container hostname. Requires a fresh UTS namespace.
///
/// # Errors
///
/// Returns [`LaunchError::Setup`] if `sethostname(2)` fails.
pub fn set_container_hostname() -> Result<()> {
    tracing::debug!(hostname = CONTAINER_HOSTNAME, "setting hostname");
    nix::unistd::sethostname(CONTAINER_HOSTNAME)
        .map_err(|e| LaunchError::Setup(format!("failed to set hostname: {e}")))?;
    Ok(())
}

/// Change the root filesystem to `new_root`.
///
/// # Errors
///
/// Returns [`LaunchError::Setup`] if `chroot(2)` fails, e.g. the path is
/// missing or the process lacks privilege.
pub fn enter_root(new_root: &Path) -> Result<()> {
    tracing::debug!(root = %new_root.display(), "chroot");
    nix::unistd::chroot(new_root).map_err(|e| {
        LaunchError::Setup(format!("failed to chroot to {}: {e}", new_root.display()))
    })?;
    Ok(())
}

/// Best-effort directory creation inside the new root. The directory often
/// already exists; failure here never aborts the launch.
pub fn ensure_dir(path: &Path) {
    if let Err(e) = std::fs::create_dir_all(path) {
        tracing::debug!(path = %path.display(), error = %e, "could not create initial dir");
    }
}

/// Mount a fresh procfs at `proc`, relative to the current directory.
/// The caller must already sit at the post-chroot `/`.
///
/// # Errors
///
/// Returns [`LaunchError::Setup`] if the mount fails.
pub fn mount_proc() -> Result<()> {
    tracing::debug!("mounting proc");
    nix::mount::mount(
        Some("proc"),
        "proc",
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| LaunchError::Setup(format!("failed to mount proc: {e}")))?;
    Ok(())
}

/// Lazily unmount `/proc` on the way out. Best-effort: the mount namespace
/// dies with the process anyway, so a failure is only worth a log line.
pub fn unmount_proc() {
    if let Err(e) = nix::mount::umount2("/proc", MntFlags::MNT_DETACH) {
        tracing::warn!(error = %e, "proc unmount failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_root_path_is_fatal() {
        let err = enter_root(&PathBuf::from("/definitely/not/a/rootfs")).unwrap_err();
        assert!(matches!(err, LaunchError::Setup(_)));
    }

    #[test]
    fn ensure_dir_swallows_failure() {
        // Unwritable parent as a non-root user; must not panic or error.
        ensure_dir(&PathBuf::from("/proc/no-such-dir/child"));
    }

    #[test]
    fn ensure_dir_accepts_existing_directory() {
        let tmp = std::env::temp_dir();
        ensure_dir(&tmp);
        assert!(tmp.exists());
    }
}
