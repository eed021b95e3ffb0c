//! Lifecycle supervision
//!
//! One [`Supervisor`] per process instance owns the single [`ManagedProcess`]
//! that phase produced (the relaunched self in run phase, the target command
//! in child phase). It waits on the process, the optional deadline, and an
//! interrupt channel, and drives exactly one pass through the teardown:
//! terminate signal, bounded grace period, forced kill, best-effort proc
//! unmount.
//!
//! Interrupts arrive as messages rather than raw signals so every trigger
//! path is serialized through the same channel; the binary wires SIGINT into
//! the sender.

use crate::isolation::rootfs;
use crate::{LaunchError, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Default grace period between the terminate signal and the forced kill.
/// Long enough for an orderly target shutdown; tunable via
/// [`Supervisor::with_grace`].
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle states of the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No process adopted yet
    Starting,
    /// Waiting on the managed process
    Running,
    /// The single cleanup pass is underway
    ShuttingDown,
    /// Cleanup finished
    Done,
}

/// A subprocess the supervisor owns. Exactly one exists per process
/// instance; only the supervisor signals, waits on, or kills it.
#[derive(Debug)]
pub struct ManagedProcess {
    child: Child,
    started_at: Instant,
    deadline: Option<Instant>,
}

impl ManagedProcess {
    /// Wrap a freshly spawned child, arming the deadline if one is set.
    #[must_use]
    pub fn new(child: Child, timeout: Option<Duration>) -> Self {
        Self {
            child,
            started_at: Instant::now(),
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// OS process id, if the process has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Ask the process to terminate. Tolerates an already-dead process: a
    /// failed delivery is logged, never an error.
    fn signal_term(&self) {
        let Some(pid) = self.child.id().and_then(|p| i32::try_from(p).ok()) else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "terminate signal not delivered");
        }
    }
}

/// What the launch ultimately reports to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The managed process exited and its status propagates.
    Exited(u8),
    /// Termination had to be forced; the launch reports failure.
    Forced,
}

impl ExitOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Exited(code) => code,
            Self::Forced => 1,
        }
    }
}

/// Result of one cleanup pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShutdownReport {
    /// Exit status collected during the grace period, if the process went
    /// down gracefully.
    pub status: Option<ExitStatus>,
    /// The forced-kill path ran (grace expired or a second interrupt).
    pub forced: bool,
}

/// What ended the `Running` state.
#[derive(Debug)]
enum Trigger {
    Exited(std::io::Result<ExitStatus>),
    Interrupt,
    DeadlineExpired,
}

/// Drives one managed process from spawn to teardown.
#[derive(Debug)]
pub struct Supervisor {
    grace: Duration,
    unmount_proc: bool,
    state: SupervisorState,
    managed: Option<ManagedProcess>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            grace: DEFAULT_GRACE,
            unmount_proc: false,
            state: SupervisorState::Starting,
            managed: None,
        }
    }

    /// Override the grace period before the forced kill.
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Unmount `/proc` during cleanup (child phase only).
    #[must_use]
    pub const fn with_proc_unmount(mut self, unmount: bool) -> Self {
        self.unmount_proc = unmount;
        self
    }

    /// Take ownership of the phase's spawned process.
    pub fn adopt(&mut self, managed: ManagedProcess) {
        self.managed = Some(managed);
    }

    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// Wait until the managed process exits, the deadline elapses, or an
    /// interrupt arrives, whichever comes first, then run the single
    /// cleanup pass and map the result to an [`ExitOutcome`].
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Execution`] if no process was adopted, and
    /// [`LaunchError::Io`] if the wait itself fails.
    pub async fn supervise(&mut self, interrupts: &mut mpsc::Receiver<()>) -> Result<ExitOutcome> {
        self.state = SupervisorState::Running;

        let trigger = if let Some(managed) = self.managed.as_mut() {
            let deadline = managed.deadline;
            tracing::debug!(pid = managed.child.id(), ?deadline, "supervising");

            tokio::select! {
                status = managed.child.wait() => Trigger::Exited(status),
                () = next_interrupt(interrupts) => Trigger::Interrupt,
                () = sleep_until_deadline(deadline) => Trigger::DeadlineExpired,
            }
        } else {
            self.shutdown(interrupts).await;
            return Err(LaunchError::Execution(
                "no managed process adopted".to_owned(),
            ));
        };

        let mut wait_error = None;
        let natural = match trigger {
            Trigger::Exited(Ok(status)) => {
                let managed = self.managed.take();
                tracing::debug!(
                    ?status,
                    elapsed = ?managed.map(|m| m.started_at.elapsed()),
                    "managed process exited"
                );
                Some(status)
            }
            Trigger::Exited(Err(e)) => {
                // Keep the handle: cleanup can still signal and kill it.
                tracing::debug!(error = %e, "wait on managed process failed");
                wait_error = Some(e);
                None
            }
            Trigger::Interrupt => {
                tracing::debug!("interrupt received");
                None
            }
            Trigger::DeadlineExpired => {
                tracing::debug!("deadline expired");
                None
            }
        };

        let report = self.shutdown(interrupts).await;

        if let Some(e) = wait_error {
            return Err(e.into());
        }

        let outcome = natural.or(report.status).map_or_else(
            || ExitOutcome::Forced,
            |status| ExitOutcome::Exited(exit_code(status)),
        );
        if report.forced {
            return Ok(ExitOutcome::Forced);
        }
        Ok(outcome)
    }

    /// The single cleanup pass: terminate signal if the process is still
    /// alive, bounded grace wait (a second interrupt escalates immediately),
    /// forced kill if needed, then the best-effort proc unmount.
    ///
    /// Idempotent and safe without an adopted process; a repeated invocation
    /// returns an empty report.
    pub async fn shutdown(&mut self, interrupts: &mut mpsc::Receiver<()>) -> ShutdownReport {
        if matches!(
            self.state,
            SupervisorState::ShuttingDown | SupervisorState::Done
        ) {
            return ShutdownReport::default();
        }
        self.state = SupervisorState::ShuttingDown;

        let mut report = ShutdownReport::default();
        if let Some(mut managed) = self.managed.take() {
            managed.signal_term();

            tokio::select! {
                status = managed.child.wait() => report.status = status.ok(),
                () = tokio::time::sleep(self.grace) => {
                    tracing::warn!("grace period expired, killing");
                    report.forced = true;
                }
                () = next_interrupt(interrupts) => {
                    tracing::warn!("second interrupt, forcing termination");
                    report.forced = true;
                }
            }

            if report.status.is_none() {
                if let Err(e) = managed.child.kill().await {
                    tracing::warn!(error = %e, "forced kill failed");
                }
            }
        }

        if self.unmount_proc {
            rootfs::unmount_proc();
        }

        self.state = SupervisorState::Done;
        report
    }
}

/// Resolve once an interrupt message arrives. A closed channel means no
/// interrupt can ever arrive, so it parks instead of resolving.
async fn next_interrupt(interrupts: &mut mpsc::Receiver<()>) {
    if interrupts.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

/// Resolve when the deadline passes; park forever when none is armed.
async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Shell-convention exit code: the process's own code, or `128 + signal`
/// for a signal death.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn exit_code(status: ExitStatus) -> u8 {
    status.code().map_or_else(
        || status.signal().map_or(1, |sig| 128_u8.saturating_add(sig as u8)),
        |code| (code & 0xff) as u8,
    )
}
