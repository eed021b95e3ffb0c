//! Linux namespace isolation
//!
//! The relaunch needs the three unshares split across the process boundary:
//! `unshare(CLONE_NEWPID)` only places *children* of the caller into the new
//! PID namespace, so it must run in the run-phase parent before the spawn,
//! while the UTS and mount unshares run in the forked child (pre-exec) so
//! neither ever applies to the parent's side of the relaunch.

use crate::{LaunchError, Result};
use nix::sched::CloneFlags;

/// Configuration for namespace isolation
#[derive(Debug, Clone, Copy)]
pub struct NamespaceConfig {
    /// Create new UTS namespace (isolated hostname)
    pub uts: bool,
    /// Create new PID namespace (container sees itself as PID 1)
    pub pid: bool,
    /// Create new mount namespace (isolated mount table)
    pub mount: bool,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            uts: true,
            pid: true,
            mount: true,
        }
    }
}

impl NamespaceConfig {
    /// Convert to nix `CloneFlags`
    #[must_use]
    pub fn to_clone_flags(self) -> CloneFlags {
        let mut flags = CloneFlags::empty();

        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }
        if self.pid {
            flags |= CloneFlags::CLONE_NEWPID;
        }
        if self.mount {
            flags |= CloneFlags::CLONE_NEWNS;
        }

        flags
    }

    /// Parent-side unshare: future children of the calling process enter a
    /// new PID namespace.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Namespace`] if the unshare syscall fails.
    pub fn isolate_children(self) -> Result<()> {
        if !self.pid {
            return Ok(());
        }
        nix::sched::unshare(CloneFlags::CLONE_NEWPID).map_err(|e| {
            LaunchError::Namespace(format!("failed to unshare pid namespace: {e}"))
        })?;
        Ok(())
    }

    /// Child-side unshare for the UTS and mount namespaces, shaped for a
    /// `pre_exec` hook: runs between fork and exec, returns `io::Result`,
    /// and only makes the one async-signal-safe syscall.
    ///
    /// # Errors
    ///
    /// Returns the unshare errno as an `io::Error`.
    pub fn unshare_exec(self) -> std::io::Result<()> {
        let flags = self.to_clone_flags() & (CloneFlags::CLONE_NEWUTS | CloneFlags::CLONE_NEWNS);
        if flags.is_empty() {
            return Ok(());
        }
        nix::sched::unshare(flags).map_err(|e| std::io::Error::from_raw_os_error(e as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_requests_all_three_namespaces() {
        let flags = NamespaceConfig::default().to_clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
    }

    #[test]
    fn disabled_namespaces_are_left_out_of_flags() {
        let config = NamespaceConfig {
            uts: false,
            pid: true,
            mount: false,
        };
        assert_eq!(config.to_clone_flags(), CloneFlags::CLONE_NEWPID);
    }

    #[test]
    fn pid_disabled_makes_parent_unshare_a_noop() {
        let config = NamespaceConfig {
            uts: true,
            pid: false,
            mount: true,
        };
        // Must not touch the test process's namespaces.
        assert!(config.isolate_children().is_ok());
    }
}
