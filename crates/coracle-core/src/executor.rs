//! Child phase: container executor
//!
//! Runs inside the namespaces created by the run phase. Transitions the
//! filesystem root, then spawns the target command with stdio passed through.

use crate::config::LaunchConfig;
use crate::isolation::rootfs;
use crate::supervisor::ManagedProcess;
use crate::{LaunchError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Backstop added to the child-phase deadline. The run-phase parent holds
/// the exact timeout, so its deadline always fires first.
const DEADLINE_GUARD: Duration = Duration::from_millis(50);

/// Establish the container root, in the one order that works:
/// hostname, chroot, best-effort workdir creation, chdir to the new `/`,
/// proc mount (relative target), chdir to the configured workdir.
///
/// Chroot changes the meaning of every later path lookup, and the proc
/// mount target is relative, so the chdir to `/` has to come between them;
/// otherwise the directory pointer dangles across the root transition.
///
/// # Errors
///
/// Every step except the workdir creation is fatal, returning
/// [`LaunchError::Setup`]; the container cannot proceed without its root.
pub fn prepare_root(config: &LaunchConfig) -> Result<()> {
    tracing::debug!(
        pid = std::process::id(),
        chroot = %config.chroot.display(),
        chdir = %config.chdir.display(),
        "preparing container root"
    );

    rootfs::set_container_hostname()?;
    rootfs::enter_root(&config.chroot)?;
    rootfs::ensure_dir(&config.chdir);

    std::env::set_current_dir("/")
        .map_err(|e| LaunchError::Setup(format!("failed to chdir to new root: {e}")))?;
    rootfs::mount_proc()?;
    std::env::set_current_dir(&config.chdir).map_err(|e| {
        LaunchError::Setup(format!(
            "failed to chdir to {}: {e}",
            config.chdir.display()
        ))
    })?;

    Ok(())
}

/// Spawn the target command with inherited stdio. Its deadline is the
/// configured timeout plus a small guard margin.
///
/// # Errors
///
/// Returns [`LaunchError::Execution`] if the command cannot be spawned.
pub fn spawn_target(
    config: &LaunchConfig,
    command: &str,
    args: &[String],
) -> Result<ManagedProcess> {
    tracing::debug!(%command, ?args, "spawning target command");

    let mut cmd = Command::new(command);
    cmd.args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| LaunchError::Execution(format!("failed to spawn {command}: {e}")))?;
    Ok(ManagedProcess::new(
        child,
        config.timeout.map(|t| t + DEADLINE_GUARD),
    ))
}
