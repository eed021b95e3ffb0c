//! Error types for coracle-core

use thiserror::Error;

/// Fatal launch failures.
///
/// Cleanup-path failures (best-effort mkdir, proc unmount, signaling an
/// already-dead process) are deliberately absent: those are logged and
/// swallowed, never propagated.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("namespace error: {0}")]
    Namespace(String),

    #[error("container setup error: {0}")]
    Setup(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),
}
