//! coracle - run one command inside fresh UTS/PID/mount namespaces
//!
//! `coracle [flags] run <command> [args...]` relaunches this executable as
//! the hidden `child` phase inside new namespaces; the child phase roots
//! itself at the configured filesystem tree and runs the command. Both
//! phases put their subprocess under the lifecycle supervisor.

use clap::{Parser, Subcommand};
use coracle_core::config::{LaunchConfig, parse_duration};
use coracle_core::supervisor::ExitOutcome;
use coracle_core::{Supervisor, executor, relaunch};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "coracle")]
#[command(version, about = "Minimal namespace container launcher")]
struct Cli {
    /// Root filesystem to chroot into: an unpacked linux tree (alpine works
    /// well). Falls back to the GONTAINER_FS environment variable.
    #[arg(long = "chrt", env = "GONTAINER_FS", global = true)]
    chroot: Option<PathBuf>,

    /// Initial working directory inside the new root
    #[arg(long = "chdr", default_value = "/usr", global = true)]
    chdir: PathBuf,

    /// End the launch after this long (e.g. "500ms", "30s", "2m"); unset
    /// means run forever
    #[arg(long, value_parser = parse_duration, global = true)]
    timeout: Option<Duration>,

    /// Print internal diagnostics
    #[arg(short = 'v', long = "loud", global = true)]
    loud: bool,

    #[command(subcommand)]
    phase: Phase,
}

#[derive(Subcommand, Debug)]
enum Phase {
    /// Relaunch into fresh namespaces and run a command there
    Run {
        /// Command to run inside the container
        command: String,

        /// Arguments for the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Container side of the relaunch; runs inside the new namespaces
    #[command(hide = true)]
    Child {
        command: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl Cli {
    /// Resolve flags into the immutable launch configuration.
    fn to_config(&self) -> coracle_core::Result<LaunchConfig> {
        let config = LaunchConfig {
            chroot: self.chroot.clone().unwrap_or_default(),
            chdir: self.chdir.clone(),
            timeout: self.timeout,
            loud: self.loud,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.loud) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match launch(cli).await {
        Ok(outcome) => ExitCode::from(outcome.code()),
        Err(e) => {
            // Visible only under --loud, matching the quiet default.
            tracing::error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr, and only when `--loud` enables them; the
/// target command's own stdio is all a quiet run shows.
fn init_tracing(loud: bool) -> anyhow::Result<()> {
    let filter = if loud {
        EnvFilter::from_default_env()
            .add_directive("coracle=debug".parse()?)
            .add_directive("coracle_core=debug".parse()?)
    } else {
        EnvFilter::new("off")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn launch(cli: Cli) -> coracle_core::Result<ExitOutcome> {
    let config = cli.to_config()?;

    let (tx, mut rx) = mpsc::channel(2);
    spawn_interrupt_listener(tx);

    let (mut supervisor, managed) = match &cli.phase {
        Phase::Run { command, args } => {
            tracing::debug!(pid = std::process::id(), %command, "run phase");
            let managed = relaunch::spawn_relaunched(&config, command, args)?;
            (Supervisor::new(), managed)
        }
        Phase::Child { command, args } => {
            tracing::debug!(pid = std::process::id(), %command, "child phase");
            executor::prepare_root(&config)?;
            let managed = match executor::spawn_target(&config, command, args) {
                Ok(managed) => managed,
                Err(e) => {
                    // Proc is mounted by now; leave the root as found.
                    coracle_core::isolation::rootfs::unmount_proc();
                    return Err(e);
                }
            };
            (Supervisor::new().with_proc_unmount(true), managed)
        }
    };

    supervisor.adopt(managed);
    let outcome = supervisor.supervise(&mut rx).await?;
    tracing::debug!(?outcome, "launch finished");
    Ok(outcome)
}

/// Forward SIGINT into the supervisor's interrupt channel. The supervisor
/// treats the first message as the shutdown trigger and a second one as the
/// escalate-to-kill request.
fn spawn_interrupt_listener(tx: mpsc::Sender<()>) {
    tokio::spawn(async move {
        let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
            tracing::warn!("could not install interrupt handler");
            return;
        };
        while interrupt.recv().await.is_some() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use coracle_core::LaunchError;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(argv).expect("argv should parse")
    }

    #[test]
    fn replayed_flags_round_trip_to_an_equal_configuration() {
        let original = parse(&[
            "coracle", "--chrt", "/mnt/alpine", "--chdr", "/opt", "--timeout", "30s", "--loud",
            "run", "/bin/echo", "hi",
        ])
        .to_config()
        .expect("valid config");

        let mut argv = vec!["coracle".to_owned()];
        argv.extend(original.replay_flags());
        argv.extend(["child".to_owned(), "/bin/echo".to_owned(), "hi".to_owned()]);
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();

        let replayed = parse(&argv).to_config().expect("replay should parse");
        assert_eq!(replayed, original);
    }

    #[test]
    fn defaults_round_trip_without_timeout() {
        let original = parse(&["coracle", "--chrt", "/mnt/alpine", "run", "/bin/true"])
            .to_config()
            .expect("valid config");
        assert_eq!(original.chdir, PathBuf::from("/usr"));
        assert_eq!(original.timeout, None);

        let mut argv = vec!["coracle".to_owned()];
        argv.extend(original.replay_flags());
        argv.extend(["child".to_owned(), "/bin/true".to_owned()]);
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();

        assert_eq!(parse(&argv).to_config().expect("replay"), original);
    }

    #[test]
    fn missing_chroot_is_a_config_error() {
        let cli = Cli {
            chroot: None,
            chdir: PathBuf::from("/usr"),
            timeout: None,
            loud: false,
            phase: Phase::Run {
                command: "/bin/echo".to_owned(),
                args: vec![],
            },
        };
        assert!(matches!(
            cli.to_config(),
            Err(LaunchError::Config(_))
        ));
    }

    #[test]
    fn target_command_keeps_hyphenated_arguments() {
        let cli = parse(&[
            "coracle", "--chrt", "/mnt/alpine", "run", "/bin/sh", "-c", "echo hi",
        ]);
        let Phase::Run { command, args } = cli.phase else {
            panic!("expected run phase");
        };
        assert_eq!(command, "/bin/sh");
        assert_eq!(args, vec!["-c", "echo hi"]);
    }

    #[test]
    fn short_verbosity_flag_matches_loud() {
        let cli = parse(&["coracle", "--chrt", "/mnt/alpine", "-v", "run", "/bin/true"]);
        assert!(cli.loud);
    }

    #[test]
    fn a_phase_and_a_command_are_mandatory() {
        assert!(Cli::try_parse_from(["coracle", "--chrt", "/mnt/alpine"]).is_err());
        assert!(Cli::try_parse_from(["coracle", "--chrt", "/mnt/alpine", "run"]).is_err());
    }
}
