//! Linux isolation primitives
//!
//! This module contains the isolation mechanisms the launcher uses:
//! - `namespace` - UTS, PID, and mount namespace creation for the relaunch
//! - `rootfs` - the chroot + proc-mount root transition inside the container

pub mod namespace;
pub mod rootfs;

pub use self::namespace::NamespaceConfig;
