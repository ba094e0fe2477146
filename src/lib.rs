//! Burrow - Build chroot and SDK cache manager
//!
//! Creates, upgrades, and enters build chroots, fetching versioned SDK
//! components through a locked on-disk tarball cache shared safely
//! between processes.

pub mod cache;
pub mod chroot;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod lock;

pub use error::{BurrowError, BurrowResult};
