//! # coracle-core
//!
//! Primitives for launching one command inside fresh Linux namespaces.
//!
//! The launch happens in two phases, each a separate process image:
//! - **run**: re-invokes the current executable (`/proc/self/exe`) with new
//!   UTS, PID, and mount namespaces, forwarding the configuration as argv
//! - **child**: inside the namespaces, transitions the filesystem root
//!   (chroot + proc mount) and spawns the target command
//!
//! Both phases hand their subprocess to the [`supervisor`], which enforces
//! the optional deadline and converts interrupts into an ordered,
//! exactly-once teardown.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod executor;
pub mod isolation;
pub mod relaunch;
pub mod supervisor;

pub use config::LaunchConfig;
pub use error::LaunchError;
pub use supervisor::Supervisor;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, LaunchError>;
