//! Build chroot lifecycle
//!
//! A chroot is identified by two distinct absolute paths: `path`, the
//! tree that becomes the mounted root, and `out_path`, persistent storage
//! (caches, logs, home directories) that survives chroot recreation and
//! is spliced into the chroot's view through bind mounts.

pub mod create;
pub mod enter;
pub mod mount;
pub mod version;

use crate::error::{BurrowError, BurrowResult};
use std::path::{Path, PathBuf};

/// Version stamp file, relative to the chroot root
pub const CHROOT_VERSION_FILE: &str = "etc/chroot_version";

/// Where the source checkout appears inside the chroot
pub const SOURCE_MOUNT: &str = "mnt/host/source";

/// A build chroot descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chroot {
    path: PathBuf,
    out_path: PathBuf,
}

impl Chroot {
    /// Create a descriptor, validating the two paths
    pub fn new(path: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> BurrowResult<Self> {
        let path = path.into();
        let out_path = out_path.into();
        if !path.is_absolute() || !out_path.is_absolute() {
            return Err(BurrowError::ChrootInvalid(format!(
                "chroot paths must be absolute: {} / {}",
                path.display(),
                out_path.display()
            )));
        }
        if path == out_path {
            return Err(BurrowError::ChrootInvalid(format!(
                "chroot path and out path must be distinct: {}",
                path.display()
            )));
        }
        Ok(Self { path, out_path })
    }

    /// The chroot root tree
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persistent out-of-chroot storage
    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    /// The version stamp file inside the chroot
    pub fn version_file(&self) -> PathBuf {
        self.path.join(CHROOT_VERSION_FILE)
    }

    /// Where the source checkout is bind-mounted inside the chroot
    pub fn source_mount(&self) -> PathBuf {
        self.path.join(SOURCE_MOUNT)
    }

    /// Well-known record of the active SDK board/version
    ///
    /// An explicit file, not an environment variable, so nested shells
    /// can answer "what SDK am I in" without relying on environment
    /// inheritance.
    pub fn active_sdk_file(&self) -> PathBuf {
        self.out_path.join("sdk").join("active.json")
    }
}

/// An explicit build-target record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Board name, e.g. "board-x"
    pub board: String,
    /// Optional portage profile override
    pub profile: Option<String>,
    /// Root of the source checkout
    pub build_root: PathBuf,
}

impl BuildTarget {
    /// Create a target for `board` rooted at `build_root`
    pub fn new(board: impl Into<String>, build_root: impl Into<PathBuf>) -> Self {
        Self {
            board: board.into(),
            profile: None,
            build_root: build_root.into(),
        }
    }
}

/// Fail unless the current process is running outside any chroot
///
/// The marker is the well-known version file at the real root; commands
/// that create, mount, or enter chroots call this first instead of
/// relying on call-site discipline.
pub fn ensure_outside_chroot() -> BurrowResult<()> {
    if Path::new("/").join(CHROOT_VERSION_FILE).exists() {
        return Err(BurrowError::WrongContext {
            expected: "outside",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_paths() {
        assert!(Chroot::new("chroot", "/out").is_err());
        assert!(Chroot::new("/chroot", "out").is_err());
    }

    #[test]
    fn rejects_identical_paths() {
        assert!(Chroot::new("/build/chroot", "/build/chroot").is_err());
    }

    #[test]
    fn path_helpers() {
        let chroot = Chroot::new("/build/chroot", "/build/out").unwrap();
        assert_eq!(
            chroot.version_file(),
            PathBuf::from("/build/chroot/etc/chroot_version")
        );
        assert_eq!(
            chroot.source_mount(),
            PathBuf::from("/build/chroot/mnt/host/source")
        );
        assert_eq!(
            chroot.active_sdk_file(),
            PathBuf::from("/build/out/sdk/active.json")
        );
    }

    #[test]
    fn build_target_defaults() {
        let target = BuildTarget::new("board-x", "/src");
        assert_eq!(target.board, "board-x");
        assert!(target.profile.is_none());
    }
}
