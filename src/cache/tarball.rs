//! Tarball-unpacking cache variant
//!
//! Same key/lock/eviction discipline as [`DiskCache`], but `set_default`
//! unpacks the downloaded tarball into the entry's directory instead of
//! storing the raw archive. Compression is whatever the external `tar`
//! auto-detects from the file (xz, bz2, zst).

use crate::cache::disk::{CacheReference, DiskCache, InstallKind};
use crate::error::BurrowResult;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A disk cache whose entries are unpacked tarball trees
#[derive(Debug, Clone)]
pub struct TarballCache {
    inner: DiskCache,
}

impl TarballCache {
    /// Open (creating if needed) a tarball cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> BurrowResult<Self> {
        Ok(Self {
            inner: DiskCache::with_kind(root, InstallKind::Unpack)?,
        })
    }

    /// Resolve a key to a reference; see [`DiskCache::lookup`]
    pub fn lookup<S: AsRef<str>>(&self, key: &[S]) -> CacheReference {
        self.inner.lookup(key)
    }

    /// See [`DiskCache::delete_stale`]
    pub fn delete_stale(&self, max_age: Duration) -> BurrowResult<usize> {
        self.inner.delete_stale(max_age)
    }

    /// See [`DiskCache::stale_entries`]
    pub fn stale_entries(&self, max_age: Duration) -> BurrowResult<Vec<PathBuf>> {
        self.inner.stale_entries(max_age)
    }

    /// Cache root path
    pub fn root(&self) -> &Path {
        self.inner.root()
    }

    /// Directory holding the relative symlink index
    pub fn links_dir(&self) -> PathBuf {
        self.inner.links_dir()
    }

    /// Total payload size under the cache, in bytes
    pub fn total_size(&self) -> u64 {
        self.inner.total_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn make_tarball(dir: &Path) -> Option<PathBuf> {
        let tree = dir.join("tree");
        fs::create_dir_all(tree.join("usr/bin")).unwrap();
        fs::write(tree.join("usr/bin/tool"), b"#!/bin/sh\n").unwrap();
        fs::write(tree.join("VERSION"), b"100.0.1\n").unwrap();

        let tarball = dir.join("sdk.tar.gz");
        let status = Command::new("tar")
            .args(["-czf"])
            .arg(&tarball)
            .arg("-C")
            .arg(&tree)
            .arg(".")
            .status();
        match status {
            Ok(s) if s.success() => Some(tarball),
            // No tar on this host; nothing to test against
            _ => None,
        }
    }

    #[test]
    fn set_default_unpacks_into_entry() {
        let dir = TempDir::new().unwrap();
        let Some(tarball) = make_tarball(dir.path()) else {
            return;
        };

        let cache = TarballCache::new(dir.path().join("cache")).unwrap();
        let mut r = cache.lookup(&["board-x", "100.0.1", "sdk"]);
        r.acquire().unwrap();
        r.set_default(&tarball).unwrap();

        assert!(r.path().join("usr/bin/tool").is_file());
        assert_eq!(fs::read(r.path().join("VERSION")).unwrap(), b"100.0.1\n");
    }

    #[test]
    fn second_populate_is_discarded() {
        let dir = TempDir::new().unwrap();
        let Some(tarball) = make_tarball(dir.path()) else {
            return;
        };

        let cache = TarballCache::new(dir.path().join("cache")).unwrap();
        let mut a = cache.lookup(&["k"]);
        a.acquire().unwrap();
        a.set_default(&tarball).unwrap();

        let marker = a.path().join("FIRST");
        fs::write(&marker, b"1").unwrap();

        let mut b = cache.lookup(&["k"]);
        b.acquire().unwrap();
        b.set_default(&tarball).unwrap();

        // first committer's tree survives untouched
        assert!(marker.is_file());
    }
}
