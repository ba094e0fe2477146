//! Chroot mount tree and read-only transitions
//!
//! `mount_chroot_paths` turns a plain directory into a working chroot by
//! applying a fixed, order-sensitive bind-mount sequence. Inside a
//! private mount namespace it also cuts propagation back to the parent;
//! sharing init's namespace (the common `burrow create` case) the binds
//! are deliberately persistent host mounts, `/` propagation is left
//! untouched, and `burrow delete` tears the tree down with a recursive
//! unmount.
//!
//! The read-only/read-write guards remount the chroot root around
//! critical sections and restore the previous mode on drop. There is no
//! cross-process lock around the toggle: the assumption (inherited from
//! the original design) is that only the single entering process toggles
//! a given chroot.

use crate::chroot::Chroot;
use crate::error::{BurrowError, BurrowResult};
use crate::lock::{FileLock, LockMode};
use nix::errno::Errno;
use nix::mount::{mount, MsFlags};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const NONE: Option<&'static [u8]> = None;

/// How long to wait for another process's passwd/group copy to finish
const ETC_COPY_LOCK_TIMEOUT: Duration = Duration::from_secs(120);

/// Out-path subtrees spliced into the chroot's view
///
/// Everything written under the in-chroot target while the chroot is live
/// is physically stored under `out_path`, so it survives recreation.
pub(crate) const OUT_MOUNTS: &[(&str, &str, Option<u32>)] = &[
    ("tmp", "tmp", Some(0o1777)),
    ("home", "home", None),
    ("build", "build", None),
    ("bin", "usr/local/bin", None),
    ("cache", "var/cache", None),
    ("run", "run", Some(0o755)),
    ("logs", "var/log", None),
    ("sdk-tmp", "var/tmp", Some(0o1777)),
];

/// Identity files persisted outside the chroot and bind-mounted back in
const ETC_OVERLAYS: &[&str] = &["passwd", "group", "shadow"];

/// One line of /proc/mounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub target: PathBuf,
    pub fstype: String,
    pub options: Vec<String>,
}

impl MountEntry {
    /// Whether this mount carries the `ro` option
    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|o| o == "ro")
    }
}

/// Undo the octal escapes /proc/mounts applies to paths
fn unescape_mount_path(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3 {
            if let Ok(code) = u8::from_str_radix(&digits, 8) {
                out.push(code as char);
                chars.nth(2);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Parse /proc/mounts-format text
pub fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?.to_string();
            let target = PathBuf::from(unescape_mount_path(fields.next()?));
            let fstype = fields.next()?.to_string();
            let options = fields
                .next()?
                .split(',')
                .map(str::to_string)
                .collect();
            Some(MountEntry {
                device,
                target,
                fstype,
                options,
            })
        })
        .collect()
}

fn read_mounts() -> BurrowResult<Vec<MountEntry>> {
    let text = fs::read_to_string("/proc/mounts")
        .map_err(|e| BurrowError::io("reading /proc/mounts", e))?;
    Ok(parse_mounts(&text))
}

/// Whether two mount-namespace links name different namespaces
///
/// Unreadable links count as "same": without evidence of a private
/// namespace we must not touch global propagation.
fn namespaces_differ(own: io::Result<PathBuf>, init: io::Result<PathBuf>) -> bool {
    matches!((own, init), (Ok(a), Ok(b)) if a != b)
}

/// Whether this process runs in a mount namespace of its own
fn in_private_mount_namespace() -> bool {
    namespaces_differ(
        fs::read_link("/proc/self/ns/mnt"),
        fs::read_link("/proc/1/ns/mnt"),
    )
}

/// Find the mount entry whose target is exactly `path`
pub fn mount_entry_for(entries: &[MountEntry], path: &Path) -> Option<MountEntry> {
    // Last match wins: later lines shadow earlier mounts on the same target
    entries.iter().rev().find(|e| e.target == path).cloned()
}

/// Whether `path` is a mount point right now
pub fn is_mounted(path: &Path) -> BurrowResult<bool> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Ok(mount_entry_for(&read_mounts()?, &canonical).is_some())
}

/// Current read-only state of the mount at `path`, `None` if unmounted
pub fn mount_read_only_state(path: &Path) -> BurrowResult<Option<bool>> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Ok(mount_entry_for(&read_mounts()?, &canonical).map(|e| e.is_read_only()))
}

fn mount_err(path: &Path) -> impl FnOnce(Errno) -> BurrowError + '_ {
    move |source| BurrowError::Mount {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_dir(path: &Path, mode: Option<u32>) -> BurrowResult<()> {
    fs::create_dir_all(path)
        .map_err(|e| BurrowError::io(format!("creating {}", path.display()), e))?;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| BurrowError::io(format!("chmod {}", path.display()), e))?;
    }
    Ok(())
}

fn bind(source: &Path, target: &Path, recursive: bool) -> BurrowResult<()> {
    let mut flags = MsFlags::MS_BIND;
    if recursive {
        flags |= MsFlags::MS_REC;
    }
    debug!("Bind mount {} -> {}", source.display(), target.display());
    mount(Some(source), target, NONE, flags, NONE).map_err(mount_err(target))
}

/// Establish the full bind-mount tree for a chroot
///
/// Order is load-bearing: the source checkout must be bound before the
/// chroot self-bind (the chroot may live inside the checkout, and binding
/// self first would double up the source bind), and the self-bind must
/// exist before any later remount can target the chroot root.
pub fn mount_chroot_paths(chroot: &Chroot, source_root: &Path) -> BurrowResult<()> {
    let root = chroot.path();

    // Changes from the parent namespace propagate in; ours stay here.
    // In init's own namespace there is no parent to shield against and
    // the slave pass would rewrite propagation for every host mount.
    if in_private_mount_namespace() {
        mount(NONE, "/", NONE, MsFlags::MS_REC | MsFlags::MS_SLAVE, NONE)
            .map_err(mount_err(Path::new("/")))?;
    } else {
        debug!("Sharing the host mount namespace, leaving / propagation untouched");
    }

    // Keep remounts below self-contained if something already mounted us.
    if is_mounted(root)? {
        mount(NONE, root, NONE, MsFlags::MS_PRIVATE, NONE).map_err(mount_err(root))?;
    }

    let source_target = chroot.source_mount();
    ensure_dir(&source_target, None)?;
    bind(source_root, &source_target, false)?;

    bind(root, root, false)?;

    for (out_sub, in_sub, mode) in OUT_MOUNTS {
        let source = chroot.out_path().join(out_sub);
        let target = root.join(in_sub);
        ensure_dir(&source, *mode)?;
        ensure_dir(&target, *mode)?;
        bind(&source, &target, false)?;
    }

    mount_etc_overlays(chroot)?;

    mount(
        Some("proc"),
        &root.join("proc"),
        Some("proc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        NONE,
    )
    .map_err(mount_err(&root.join("proc")))?;

    mount(
        Some("sysfs"),
        &root.join("sys"),
        Some("sysfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        NONE,
    )
    .map_err(mount_err(&root.join("sys")))?;

    // /dev needs device nodes; no nodev here.
    bind(Path::new("/dev"), &root.join("dev"), true)?;

    // Expected to fail inside nested containers; not fatal.
    let binfmt = root.join("proc/sys/fs/binfmt_misc");
    if let Err(e) = mount(
        Some("binfmt_misc"),
        &binfmt,
        Some("binfmt_misc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        NONE,
    ) {
        match e {
            Errno::EPERM | Errno::EACCES | Errno::ENOENT | Errno::ENODEV => {
                debug!("Skipping binfmt_misc mount: {}", e);
            }
            other => return Err(mount_err(&binfmt)(other)),
        }
    }

    Ok(())
}

/// Persist passwd/group/shadow under out_path and bind them back in
///
/// The copy runs under an exclusive lock with a double-check after
/// acquisition so two processes racing on a fresh out_path produce
/// exactly one copy. The timeout converts a dead holder into an error
/// instead of an indefinite stall.
fn mount_etc_overlays(chroot: &Chroot) -> BurrowResult<()> {
    let out_etc = chroot.out_path().join("etc");
    ensure_dir(&out_etc, None)?;

    for name in ETC_OVERLAYS {
        let out_copy = out_etc.join(name);
        let in_chroot = chroot.path().join("etc").join(name);

        if !out_copy.exists() {
            let lock_path = out_etc.join(format!(".{name}.lock"));
            let mut lock =
                FileLock::acquire_timeout(&lock_path, LockMode::Exclusive, ETC_COPY_LOCK_TIMEOUT)?;
            // Double-check: another process may have copied while we waited
            if !out_copy.exists() {
                fs::copy(&in_chroot, &out_copy).map_err(|e| {
                    BurrowError::io(format!("seeding {}", out_copy.display()), e)
                })?;
            }
            lock.release()?;
        }

        bind(&out_copy, &in_chroot, false)?;
    }
    Ok(())
}

/// Remount `target` read-only or read-write in place
fn remount(target: &Path, read_only: bool) -> BurrowResult<()> {
    let mut flags = MsFlags::MS_BIND | MsFlags::MS_REMOUNT;
    if read_only {
        flags |= MsFlags::MS_RDONLY;
    }
    debug!(
        "Remounting {} {}",
        target.display(),
        if read_only { "read-only" } else { "read-write" }
    );
    match mount(NONE, target, NONE, flags, NONE) {
        Ok(()) => Ok(()),
        // Unprivileged callers go through the escalation wrapper
        Err(Errno::EPERM) => {
            let opts = if read_only {
                "remount,bind,ro"
            } else {
                "remount,bind,rw"
            };
            crate::exec::run_sync(
                "sudo",
                &[
                    "mount".to_string(),
                    "-o".to_string(),
                    opts.to_string(),
                    target.display().to_string(),
                ],
                None,
            )
        }
        Err(e) => Err(mount_err(target)(e)),
    }
}

/// Mount-state reads and remounts behind the scoped guards
///
/// The live implementation reads /proc/mounts and calls mount(2); tests
/// substitute an in-memory table, since the real operations need
/// privileges and an actual mount point.
trait RemountOps {
    /// Read-only state of the mount at `path`, `None` when unmounted
    fn read_only_state(&self, path: &Path) -> BurrowResult<Option<bool>>;

    fn remount(&self, path: &Path, read_only: bool) -> BurrowResult<()>;
}

struct HostMounts;

impl RemountOps for HostMounts {
    fn read_only_state(&self, path: &Path) -> BurrowResult<Option<bool>> {
        mount_read_only_state(path)
    }

    fn remount(&self, path: &Path, read_only: bool) -> BurrowResult<()> {
        remount(path, read_only)
    }
}

static HOST_MOUNTS: HostMounts = HostMounts;

/// Scoped remount to a desired mode, restoring the prior mode on drop
///
/// Entering with the mode already in effect performs no remount at all,
/// so nesting same-mode scopes is free, and unwinding restores each
/// previous state in turn.
struct RemountGuard<'a> {
    ops: &'a dyn RemountOps,
    target: PathBuf,
    /// Mode to restore on drop; `None` when entry was a no-op
    restore_read_only: Option<bool>,
}

impl std::fmt::Debug for RemountGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemountGuard")
            .field("target", &self.target)
            .field("restore_read_only", &self.restore_read_only)
            .finish_non_exhaustive()
    }
}

impl<'a> RemountGuard<'a> {
    fn enter(ops: &'a dyn RemountOps, target: &Path, want_read_only: bool) -> BurrowResult<Self> {
        let current = ops
            .read_only_state(target)?
            .ok_or_else(|| BurrowError::NotMounted {
                path: target.to_path_buf(),
            })?;

        let restore = if current == want_read_only {
            None
        } else {
            ops.remount(target, want_read_only)?;
            Some(current)
        };

        Ok(Self {
            ops,
            target: target.to_path_buf(),
            restore_read_only: restore,
        })
    }
}

impl Drop for RemountGuard<'_> {
    fn drop(&mut self) {
        let Some(prev) = self.restore_read_only else {
            return;
        };
        // The scope may have pivoted or unmounted things; if our mount
        // point vanished, tracking is best-effort and we skip silently.
        match self.ops.read_only_state(&self.target) {
            Ok(Some(_)) => {
                if let Err(e) = self.ops.remount(&self.target, prev) {
                    warn!("Failed to restore mount mode on {}: {}", self.target.display(), e);
                }
            }
            Ok(None) => debug!(
                "{} no longer mounted, skipping mode restore",
                self.target.display()
            ),
            Err(e) => warn!("Could not inspect {}: {}", self.target.display(), e),
        }
    }
}

/// Hold a mount point read-only for the guard's lifetime
pub struct ChrootReadOnly(#[allow(dead_code)] RemountGuard<'static>);

impl ChrootReadOnly {
    /// Remount `target` read-only (no-op if it already is)
    pub fn enter(target: &Path) -> BurrowResult<Self> {
        Ok(Self(RemountGuard::enter(&HOST_MOUNTS, target, true)?))
    }
}

/// Hold a mount point read-write for the guard's lifetime
pub struct ChrootReadWrite(#[allow(dead_code)] RemountGuard<'static>);

impl ChrootReadWrite {
    /// Remount `target` read-write (no-op if it already is)
    pub fn enter(target: &Path) -> BurrowResult<Self> {
        Ok(Self(RemountGuard::enter(&HOST_MOUNTS, target, false)?))
    }
}
