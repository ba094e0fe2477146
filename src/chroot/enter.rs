//! Entering an existing chroot
//!
//! The pivot itself is delegated to `sudo chroot`; this module owns the
//! preconditions (suid-capable filesystem, resource-limit floors) and the
//! optional read-only guard around the session.

use crate::chroot::mount::ChrootReadOnly;
use crate::chroot::{ensure_outside_chroot, Chroot, SOURCE_MOUNT};
use crate::error::{BurrowError, BurrowResult};
use crate::exec;
use nix::sys::statvfs::{statvfs, FsFlags};
use rlimit::Resource;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Soft RLIMIT_NPROC floor; parallel builds fork aggressively
const NPROC_FLOOR: u64 = 4096;

/// RLIMIT_NOFILE floor
const NOFILE_FLOOR: u64 = 262_144;

/// vm.max_map_count floor; the linker mmaps one region per input object
const MAX_MAP_COUNT_FLOOR: u64 = 524_288;

const MAX_MAP_COUNT_FILE: &str = "/proc/sys/vm/max_map_count";

/// Per-invocation entry options
#[derive(Debug, Clone, Default)]
pub struct EnterOpts {
    /// Remount the chroot read-only for the duration of the session
    pub read_only: bool,
    /// Working directory inside the chroot; defaults to the source mount
    pub cwd: Option<PathBuf>,
    /// Extra environment for the command inside the chroot
    pub env: HashMap<String, String>,
}

/// Decide a new soft limit given the current pair and a desired floor
///
/// Returns `None` when no change is needed. The hard limit is never
/// raised; the soft limit is capped by it.
pub fn raised_soft_limit(soft: u64, hard: u64, floor: u64) -> Option<u64> {
    let want = floor.min(hard);
    if soft >= want {
        None
    } else {
        Some(want)
    }
}

/// Runs commands inside a chroot as a given user
pub struct ChrootEnterer {
    chroot: Chroot,
    user: String,
}

impl ChrootEnterer {
    pub fn new(chroot: Chroot, user: impl Into<String>) -> Self {
        Self {
            chroot,
            user: user.into(),
        }
    }

    /// Run `command` inside the chroot, returning its raw exit code
    ///
    /// An empty command starts a login shell. Stdio is inherited so
    /// interactive sessions work.
    pub async fn enter(&self, command: &[String], opts: &EnterOpts) -> BurrowResult<i32> {
        ensure_outside_chroot()?;

        if !self.chroot.version_file().exists() {
            return Err(BurrowError::UninitializedChroot {
                path: self.chroot.path().to_path_buf(),
                version_file: self.chroot.version_file(),
            });
        }

        self.check_suid_capable()?;
        raise_process_limits();
        raise_max_map_count(MAX_MAP_COUNT_FLOOR);

        let _guard = if opts.read_only {
            Some(ChrootReadOnly::enter(self.chroot.path())?)
        } else {
            None
        };

        let (program, args) = self.build_argv(command, opts);
        exec::run_interactive(&program, &args, None, &HashMap::new()).await
    }

    /// Entering relies on the in-chroot `sudo` honoring its setuid bit,
    /// which a nosuid mount silently strips
    fn check_suid_capable(&self) -> BurrowResult<()> {
        let sudo = self.chroot.path().join("usr/bin/sudo");
        let probe = if sudo.exists() {
            sudo
        } else {
            self.chroot.path().to_path_buf()
        };
        let stat = statvfs(&probe).map_err(|e| BurrowError::Mount {
            path: probe.clone(),
            source: e,
        })?;
        if stat.flags().contains(FsFlags::ST_NOSUID) {
            return Err(BurrowError::SudoNosuid { path: probe });
        }
        Ok(())
    }

    /// The full argv for the pivot: sudo -> chroot -> per-user sudo ->
    /// env (cwd + overrides) -> command
    fn build_argv(&self, command: &[String], opts: &EnterOpts) -> (String, Vec<String>) {
        let mut args = vec![
            "chroot".to_string(),
            self.chroot.path().display().to_string(),
            "sudo".to_string(),
            "-u".to_string(),
            self.user.clone(),
            "--".to_string(),
            "env".to_string(),
        ];

        match &opts.cwd {
            Some(cwd) => args.push(format!("--chdir={}", cwd.display())),
            None => args.push(format!("--chdir=/{SOURCE_MOUNT}")),
        }

        let mut env: Vec<_> = opts.env.iter().collect();
        env.sort();
        for (k, v) in env {
            args.push(format!("{k}={v}"));
        }

        if command.is_empty() {
            args.push("/bin/bash".to_string());
            args.push("-l".to_string());
        } else {
            args.extend(command.iter().cloned());
        }

        ("sudo".to_string(), args)
    }
}

/// Raise soft limits that default too low for builds; best effort
fn raise_process_limits() {
    for (resource, floor) in [(Resource::NPROC, NPROC_FLOOR), (Resource::NOFILE, NOFILE_FLOOR)] {
        match resource.get() {
            Ok((soft, hard)) => {
                if let Some(new_soft) = raised_soft_limit(soft, hard, floor) {
                    debug!("Raising {} soft limit {} -> {}", resource.as_name(), soft, new_soft);
                    if let Err(e) = resource.set(new_soft, hard) {
                        warn!("Failed to raise {}: {}", resource.as_name(), e);
                    }
                }
            }
            Err(e) => warn!("Failed to read {}: {}", resource.as_name(), e),
        }
    }
}

/// Raise vm.max_map_count when the sysctl exists; best effort
fn raise_max_map_count(floor: u64) {
    let path = Path::new(MAX_MAP_COUNT_FILE);
    let current = match fs::read_to_string(path) {
        Ok(text) => text.trim().parse::<u64>().unwrap_or(0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} absent, skipping", MAX_MAP_COUNT_FILE);
            return;
        }
        Err(e) => {
            warn!("Failed to read {}: {}", MAX_MAP_COUNT_FILE, e);
            return;
        }
    };
    if current >= floor {
        return;
    }
    debug!("Raising vm.max_map_count {} -> {}", current, floor);
    if let Err(e) = fs::write(path, format!("{floor}\n")) {
        warn!("Failed to raise vm.max_map_count to {}: {}", floor, e);
    }
}
