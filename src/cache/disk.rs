//! Keyed disk cache with lock-based pinning
//!
//! Layout under the cache root:
//!
//! - `entries/<k0>/<k1>/...`: entry payloads (files, or directories for
//!   the tarball variant)
//! - `locks/<k0>/<k1>/....lock`: one lock file per entry
//! - `staging/<uuid>`: per-process scratch for atomic rename-into-place
//! - `links/...`: relative symlink index maintained by the SDK fetcher
//!
//! Nothing in memory owns an on-disk entry; correctness across processes
//! rests entirely on the lock files.

use crate::error::{BurrowError, BurrowResult};
use crate::lock::{FileLock, LockMode};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const ENTRIES_DIR: &str = "entries";
const LOCKS_DIR: &str = "locks";
const STAGING_DIR: &str = "staging";
const LINKS_DIR: &str = "links";

/// How an entry payload is installed during `set_default`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstallKind {
    /// Copy the source file verbatim
    File,
    /// Unpack the source tarball into a directory
    Unpack,
}

/// Sanitize one key component into a path segment
///
/// Pure: the same component always maps to the same segment in every
/// process. Components that survive unchanged are used as-is; anything
/// altered gets a content-digest suffix so distinct keys cannot collide.
fn sanitize_component(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let unchanged = cleaned == component && !component.is_empty() && component != "." && component != "..";
    if unchanged {
        cleaned
    } else {
        let digest = Sha256::digest(component.as_bytes());
        format!("{}-{}", cleaned, hex::encode(&digest[..4]))
    }
}

/// A directory-tree cache rooted at a configurable path
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
    kind: InstallKind,
}

impl DiskCache {
    /// Open (creating if needed) a cache rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> BurrowResult<Self> {
        Self::with_kind(root, InstallKind::File)
    }

    pub(crate) fn with_kind(root: impl Into<PathBuf>, kind: InstallKind) -> BurrowResult<Self> {
        let root = root.into();
        for sub in [ENTRIES_DIR, LOCKS_DIR, STAGING_DIR, LINKS_DIR] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir)
                .map_err(|e| BurrowError::io(format!("creating cache directory {}", dir.display()), e))?;
        }
        Ok(Self { root, kind })
    }

    /// Cache root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the relative symlink index
    pub fn links_dir(&self) -> PathBuf {
        self.root.join(LINKS_DIR)
    }

    /// Resolve a key to a reference
    ///
    /// Pure and deterministic; never touches disk. Equal keys resolve to
    /// equal paths in every process.
    pub fn lookup<S: AsRef<str>>(&self, key: &[S]) -> CacheReference {
        let segments: Vec<String> = key.iter().map(|s| sanitize_component(s.as_ref())).collect();
        let mut path = self.root.join(ENTRIES_DIR);
        let mut lock_path = self.root.join(LOCKS_DIR);
        for (i, seg) in segments.iter().enumerate() {
            path.push(seg);
            if i + 1 == segments.len() {
                // Appended, not set_extension: key components may contain
                // dots of their own (e.g. "sysroot.tar.xz").
                lock_path.push(format!("{seg}.lock"));
            } else {
                lock_path.push(seg);
            }
        }

        CacheReference {
            key: key.iter().map(|s| s.as_ref().to_string()).collect(),
            path,
            lock_path,
            staging: self.root.join(STAGING_DIR),
            kind: self.kind,
            lock: None,
        }
    }

    /// Remove entries whose payload is older than `max_age`
    ///
    /// Entries whose lock cannot be taken non-blocking are in use by some
    /// process and are skipped. Dangling symlink-index links are pruned as
    /// part of the same sweep. Returns the number of entries removed.
    pub fn delete_stale(&self, max_age: Duration) -> BurrowResult<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let locks_root = self.root.join(LOCKS_DIR);
        let entries_root = self.root.join(ENTRIES_DIR);
        let mut removed = 0;

        for item in WalkDir::new(&locks_root).into_iter().filter_map(Result::ok) {
            if !item.file_type().is_file() {
                continue;
            }
            let Some(stem) = item
                .file_name()
                .to_str()
                .and_then(|n| n.strip_suffix(".lock"))
            else {
                continue;
            };
            let rel = item
                .path()
                .strip_prefix(&locks_root)
                .map_err(|_| BurrowError::Internal("lock file outside locks root".to_string()))?;
            let entry = entries_root.join(rel.with_file_name(stem));

            let Ok(meta) = fs::symlink_metadata(&entry) else {
                continue;
            };
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if mtime >= cutoff {
                continue;
            }

            // A failed non-blocking exclusive lock means the entry is
            // pinned or mid-populate; leave it alone.
            let Some(_lock) = FileLock::try_acquire(item.path(), LockMode::Exclusive)? else {
                debug!("Skipping locked cache entry {}", entry.display());
                continue;
            };

            debug!("Evicting stale cache entry {}", entry.display());
            let res = if meta.is_dir() {
                fs::remove_dir_all(&entry)
            } else {
                fs::remove_file(&entry)
            };
            match res {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to evict {}: {}", entry.display(), e),
            }
        }

        self.prune_dangling_links()?;
        Ok(removed)
    }

    /// Entries a `delete_stale` sweep with the same `max_age` would
    /// consider
    ///
    /// Takes no locks, so a pinned entry still shows up here; a dry-run
    /// view only.
    pub fn stale_entries(&self, max_age: Duration) -> BurrowResult<Vec<PathBuf>> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let locks_root = self.root.join(LOCKS_DIR);
        let entries_root = self.root.join(ENTRIES_DIR);
        let mut out = Vec::new();

        for item in WalkDir::new(&locks_root).into_iter().filter_map(Result::ok) {
            if !item.file_type().is_file() {
                continue;
            }
            let Some(stem) = item
                .file_name()
                .to_str()
                .and_then(|n| n.strip_suffix(".lock"))
            else {
                continue;
            };
            let rel = item
                .path()
                .strip_prefix(&locks_root)
                .map_err(|_| BurrowError::Internal("lock file outside locks root".to_string()))?;
            let entry = entries_root.join(rel.with_file_name(stem));

            let Ok(meta) = fs::symlink_metadata(&entry) else {
                continue;
            };
            if meta.modified().unwrap_or(SystemTime::UNIX_EPOCH) < cutoff {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Drop symlink-index links whose backing entry was evicted
    fn prune_dangling_links(&self) -> BurrowResult<()> {
        let links_root = self.root.join(LINKS_DIR);
        for item in WalkDir::new(&links_root).into_iter().filter_map(Result::ok) {
            if !item.path_is_symlink() {
                continue;
            }
            // fs::metadata follows the link; error means the target is gone
            if fs::metadata(item.path()).is_err() {
                debug!("Pruning dangling link {}", item.path().display());
                if let Err(e) = fs::remove_file(item.path()) {
                    warn!("Failed to prune link {}: {}", item.path().display(), e);
                }
            }
        }
        Ok(())
    }

    /// Total payload size under the cache, in bytes
    pub fn total_size(&self) -> u64 {
        WalkDir::new(self.root.join(ENTRIES_DIR))
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }
}

/// A handle to one entry in the cache
///
/// The handle itself owns nothing on disk; `acquire()` takes a shared
/// lock pinning the entry against eviction until `release()` (or drop).
#[derive(Debug)]
pub struct CacheReference {
    key: Vec<String>,
    path: PathBuf,
    lock_path: PathBuf,
    staging: PathBuf,
    kind: InstallKind,
    lock: Option<FileLock>,
}

impl CacheReference {
    /// The entry's deterministic payload location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The key this reference was looked up with
    pub fn key(&self) -> &[String] {
        &self.key
    }

    /// Whether the entry is currently pinned by this reference
    pub fn is_acquired(&self) -> bool {
        self.lock.is_some()
    }

    /// Pin the entry with a shared lock
    ///
    /// An eviction sweep that started before this acquire may already have
    /// passed its existence check, so callers must re-check `exists()`
    /// after acquiring.
    pub fn acquire(&mut self) -> BurrowResult<()> {
        if self.lock.is_none() {
            self.lock = Some(FileLock::acquire(&self.lock_path, LockMode::Shared)?);
        }
        Ok(())
    }

    /// Unpin the entry
    pub fn release(&mut self) {
        self.lock = None;
    }

    /// Whether the payload has been installed
    ///
    /// With `lock = true`, takes the shared lock first so a concurrent
    /// `remove` or sweep cannot race the check-then-use pattern.
    pub fn exists(&mut self, lock: bool) -> BurrowResult<bool> {
        if lock {
            self.acquire()?;
        }
        Ok(self.path.exists())
    }

    /// Install `source` as the entry's permanent payload, exactly once
    ///
    /// Content is staged privately and renamed into place under the
    /// exclusive lock. If another process committed first, `source` is
    /// left untouched and nothing is installed; callers must ensure
    /// content is a pure function of the key for this
    /// first-committer-wins outcome to be sound; the cache does not
    /// verify it.
    pub fn set_default(&mut self, source: &Path) -> BurrowResult<()> {
        let source = source.to_path_buf();
        self.populate_with(|| Ok(source)).map(|_| ())
    }

    /// Populate the entry exactly once, holding the exclusive lock
    /// across the producer
    ///
    /// `produce` runs only when the payload is still missing after the
    /// upgrade to exclusive, so concurrent callers of the same key
    /// serialize here: at most one producer (download, copy, unpack) is
    /// ever in flight per entry. The produced file is staged and renamed
    /// into place, then the lock drops back to shared. Returns whether
    /// `produce` ran.
    pub fn populate_with<F>(&mut self, produce: F) -> BurrowResult<bool>
    where
        F: FnOnce() -> BurrowResult<PathBuf>,
    {
        let path = self.path.clone();
        let staging = self.staging.clone();
        let kind = self.kind;
        let key = self.key.clone();
        let lock = self
            .lock
            .as_mut()
            .ok_or_else(|| BurrowError::CacheNotAcquired { key: key.clone() })?;

        if path.exists() {
            return Ok(false);
        }

        // flock cannot upgrade atomically, so the existence double-check
        // after the relock is load-bearing.
        lock.relock(LockMode::Exclusive)?;
        let result = (|| {
            if path.exists() {
                debug!("Lost populate race for {:?}", key);
                return Ok(false);
            }
            let source = produce()?;
            let staged = stage_payload(&source, &staging, kind)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| BurrowError::io("creating cache entry directory", e))?;
            }
            fs::rename(&staged, &path).map_err(|e| {
                BurrowError::io(format!("installing cache entry {}", path.display()), e)
            })?;
            Ok(true)
        })();
        lock.relock(LockMode::Shared)?;
        result
    }

    /// Delete the entry's payload
    pub fn remove(&mut self) -> BurrowResult<()> {
        let lock = self
            .lock
            .as_mut()
            .ok_or_else(|| BurrowError::CacheNotAcquired { key: self.key.clone() })?;

        lock.relock(LockMode::Exclusive)?;
        let result = if self.path.exists() {
            remove_any(&self.path)
        } else {
            Ok(())
        };
        lock.relock(LockMode::Shared)?;
        result
    }
}

/// Copy (or unpack) `source` into a fresh staging location
fn stage_payload(source: &Path, staging: &Path, kind: InstallKind) -> BurrowResult<PathBuf> {
    let staged = staging.join(Uuid::new_v4().to_string());
    match kind {
        InstallKind::File => {
            fs::copy(source, &staged).map_err(|e| {
                BurrowError::io(format!("staging {} into cache", source.display()), e)
            })?;
        }
        InstallKind::Unpack => {
            fs::create_dir_all(&staged)
                .map_err(|e| BurrowError::io("creating staging directory", e))?;
            crate::exec::run_sync(
                "tar",
                &[
                    "-xf".to_string(),
                    source.display().to_string(),
                    "-C".to_string(),
                    staged.display().to_string(),
                ],
                None,
            )?;
        }
    }
    Ok(staged)
}

fn remove_any(path: &Path) -> BurrowResult<()> {
    let meta = fs::symlink_metadata(path)
        .map_err(|e| BurrowError::io(format!("inspecting {}", path.display()), e))?;
    let res = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    res.map_err(|e| BurrowError::io(format!("removing {}", path.display()), e))
}
