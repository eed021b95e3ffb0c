//! Run phase: relaunch into fresh namespaces
//!
//! Namespace isolation needs a new process image, so the run phase re-invokes
//! the current executable (`/proc/self/exe`) as the child phase. The argv it
//! builds is the only channel between the phases: echoed flags, the `child`
//! keyword, then the verbatim target command.

use crate::config::LaunchConfig;
use crate::isolation::NamespaceConfig;
use crate::supervisor::ManagedProcess;
use crate::{LaunchError, Result};
use std::process::Stdio;
use tokio::process::Command;

/// Phase keyword the relaunched process is invoked with.
pub const CHILD_PHASE: &str = "child";

/// Argv for the relaunched executable: the configuration replayed as flags,
/// the phase keyword, then the target command and its arguments.
#[must_use]
pub fn child_argv(config: &LaunchConfig, command: &str, args: &[String]) -> Vec<String> {
    let mut argv = config.replay_flags();
    argv.push(CHILD_PHASE.to_owned());
    argv.push(command.to_owned());
    argv.extend(args.iter().cloned());
    argv
}

/// Spawn the current executable as the child phase inside new UTS, PID, and
/// mount namespaces, with stdio passed straight through.
///
/// # Errors
///
/// Returns [`LaunchError::Namespace`] if the PID unshare fails and
/// [`LaunchError::Execution`] if the relaunch itself cannot be spawned.
pub fn spawn_relaunched(
    config: &LaunchConfig,
    command: &str,
    args: &[String],
) -> Result<ManagedProcess> {
    let namespaces = NamespaceConfig::default();
    let argv = child_argv(config, command, args);
    tracing::debug!(pid = std::process::id(), ?argv, "relaunching into new namespaces");

    // PID namespaces apply to children of the caller, so this one runs on
    // the parent side before the spawn; the child phase becomes PID 1.
    namespaces.isolate_children()?;

    let mut cmd = Command::new("/proc/self/exe");
    cmd.args(&argv)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    // SAFETY: the hook runs between fork and exec and performs a single
    // async-signal-safe unshare syscall.
    #[allow(unsafe_code)]
    unsafe {
        cmd.pre_exec(move || namespaces.unshare_exec());
    }

    let child = cmd
        .spawn()
        .map_err(|e| LaunchError::Execution(format!("failed to relaunch self: {e}")))?;
    Ok(ManagedProcess::new(child, config.timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn child_argv_is_flags_then_phase_then_command() {
        let config = LaunchConfig {
            chroot: PathBuf::from("/mnt/alpine"),
            chdir: PathBuf::from("/usr"),
            timeout: Some(Duration::from_secs(5)),
            loud: true,
        };
        let argv = child_argv(&config, "/bin/echo", &["hi".to_owned()]);
        assert_eq!(
            argv,
            vec![
                "--chrt",
                "/mnt/alpine",
                "--chdr",
                "/usr",
                "--timeout",
                "5000ms",
                "--loud",
                "child",
                "/bin/echo",
                "hi",
            ]
        );
    }

    #[test]
    fn target_arguments_survive_verbatim() {
        let config = LaunchConfig {
            chroot: PathBuf::from("/mnt/alpine"),
            chdir: PathBuf::from("/usr"),
            timeout: None,
            loud: false,
        };
        let args = vec!["-c".to_owned(), "echo hi; exit 3".to_owned()];
        let argv = child_argv(&config, "/bin/sh", &args);
        assert_eq!(&argv[argv.len() - 3..], ["/bin/sh", "-c", "echo hi; exit 3"]);
    }
}
