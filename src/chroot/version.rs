//! Chroot version state machine
//!
//! The chroot stamps an integer schema version in `etc/chroot_version`.
//! Upgrade hooks live in a directory as `<version>_<description>` files;
//! applying updates runs each pending hook in ascending order and
//! advances the stamp one version at a time, so a failed hook leaves a
//! clean resume point.

use crate::chroot::Chroot;
use crate::error::{BurrowError, BurrowResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Executes one upgrade hook inside a chroot
///
/// A seam so the state machine can be driven in tests without mounts or
/// privileges; the production implementation pivots into the chroot.
#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Run `hook` inside `chroot`, returning the hook's exit code
    async fn run_hook(&self, chroot: &Chroot, hook: &Path) -> BurrowResult<i32>;
}

/// Runs hooks through `sudo chroot`, with the hook script bind-visible
/// under the source mount
pub struct ChrootHookRunner;

#[async_trait]
impl HookRunner for ChrootHookRunner {
    async fn run_hook(&self, chroot: &Chroot, hook: &Path) -> BurrowResult<i32> {
        let args = vec![
            "chroot".to_string(),
            chroot.path().display().to_string(),
            "/bin/bash".to_string(),
            hook.display().to_string(),
        ];
        crate::exec::run_interactive("sudo", &args, None, &HashMap::new()).await
    }
}

/// Parse the leading version integer out of a hook filename
///
/// Filenames are `<integer>_<description>`; the description is free-form
/// and ignored except for display.
fn hook_version(filename: &str) -> Option<u32> {
    let (prefix, _) = filename.split_once('_')?;
    prefix.parse().ok()
}

/// The chroot version state machine
pub struct ChrootUpdater {
    chroot: Chroot,
    hooks_dir: PathBuf,
}

impl ChrootUpdater {
    /// Create an updater reading hooks from `hooks_dir`
    pub fn new(chroot: Chroot, hooks_dir: impl Into<PathBuf>) -> Self {
        Self {
            chroot,
            hooks_dir: hooks_dir.into(),
        }
    }

    /// Read the chroot's current version
    ///
    /// A missing file and unparseable contents are distinct errors: the
    /// remediation differs (initialize vs. investigate corruption).
    pub fn get_version(&self) -> BurrowResult<u32> {
        let file = self.chroot.version_file();
        let contents = match fs::read_to_string(&file) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BurrowError::UninitializedChroot {
                    path: self.chroot.path().to_path_buf(),
                    version_file: file,
                });
            }
            Err(e) => return Err(BurrowError::io(format!("reading {}", file.display()), e)),
        };

        contents
            .trim()
            .parse::<u32>()
            .map_err(|_| BurrowError::InvalidChrootVersion {
                path: file,
                reason: format!("not a non-negative integer: {:?}", contents.trim()),
            })
    }

    /// Stamp the chroot's version
    pub fn set_version(&self, version: u32) -> BurrowResult<()> {
        let file = self.chroot.version_file();
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BurrowError::io(format!("creating {}", parent.display()), e))?;
        }
        fs::write(&file, format!("{version}\n"))
            .map_err(|e| BurrowError::io(format!("writing {}", file.display()), e))
    }

    /// Whether the chroot has ever been bootstrapped
    ///
    /// The one place the three version-read error kinds collapse to a
    /// boolean; everywhere else callers get the specific error.
    pub fn is_initialized(&self) -> bool {
        matches!(self.get_version(), Ok(v) if v > 0)
    }

    /// Discover all hooks, failing fast on duplicate versions
    fn discover_hooks(&self) -> BurrowResult<BTreeMap<u32, PathBuf>> {
        let mut hooks = BTreeMap::new();
        let entries = match fs::read_dir(&self.hooks_dir) {
            Ok(entries) => entries,
            // A checkout with no hooks directory simply has no upgrades
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(hooks),
            Err(e) => {
                return Err(BurrowError::io(
                    format!("listing hooks in {}", self.hooks_dir.display()),
                    e,
                ))
            }
        };

        for entry in entries {
            let entry = entry.map_err(|e| BurrowError::io("reading hooks directory", e))?;
            let name = entry.file_name();
            let Some(version) = name.to_str().and_then(hook_version) else {
                continue;
            };
            if let Some(first) = hooks.insert(version, entry.path()) {
                // Never silently pick one; this is a broken checkout
                return Err(BurrowError::VersionHasMultipleHooks {
                    version,
                    first,
                    second: entry.path(),
                });
            }
        }
        Ok(hooks)
    }

    /// The highest version any hook upgrades to
    pub fn latest_version(&self) -> BurrowResult<u32> {
        Ok(self
            .discover_hooks()?
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }

    /// Hooks pending for this chroot, in ascending version order
    ///
    /// A gap between the current version and the latest means an upgrade
    /// step was removed from this checkout; the chroot cannot be upgraded
    /// in place and must be recreated.
    pub fn get_updates(&self) -> BurrowResult<Vec<(u32, PathBuf)>> {
        let current = self.get_version()?;
        let hooks = self.discover_hooks()?;
        let latest = hooks.keys().next_back().copied().unwrap_or(0);

        let mut pending = Vec::new();
        for version in (current + 1)..=latest {
            match hooks.get(&version) {
                Some(hook) => pending.push((version, hook.clone())),
                None => {
                    return Err(BurrowError::ChrootDeprecated {
                        version,
                        current,
                        latest,
                    });
                }
            }
        }
        Ok(pending)
    }

    /// Apply all pending hooks transactionally, one version at a time
    ///
    /// Stops at the first failing hook without advancing past the last
    /// success; rerunning resumes from there.
    pub async fn apply_updates(&self, runner: &dyn HookRunner) -> BurrowResult<()> {
        let current = self.get_version()?;
        let latest = self.latest_version()?;
        // latest == 0 means the checkout ships no hooks at all; there is
        // nothing to compare the stamp against.
        if latest > 0 && current > latest {
            return Err(BurrowError::InvalidChrootVersion {
                path: self.chroot.version_file(),
                reason: format!(
                    "version {current} is newer than the latest known hook ({latest}); \
                     this chroot is from a newer checkout"
                ),
            });
        }

        let pending = self.get_updates()?;
        if pending.is_empty() {
            debug!("Chroot already at version {}", current);
            return Ok(());
        }

        info!("Applying {} chroot update(s): {} -> {}", pending.len(), current, latest);
        for (version, hook) in pending {
            debug!("Running upgrade hook {} ({})", version, hook.display());
            let code = runner.run_hook(&self.chroot, &hook).await?;
            if code != 0 {
                return Err(BurrowError::ChrootUpdate {
                    version,
                    hook,
                    code,
                });
            }
            self.set_version(version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeRunner {
        ran: Mutex<Vec<PathBuf>>,
        fail_on: Option<PathBuf>,
    }

    impl FakeRunner {
        fn new() -> Self {
            Self {
                ran: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(hook: PathBuf) -> Self {
            Self {
                ran: Mutex::new(Vec::new()),
                fail_on: Some(hook),
            }
        }
    }

    #[async_trait]
    impl HookRunner for FakeRunner {
        async fn run_hook(&self, _chroot: &Chroot, hook: &Path) -> BurrowResult<i32> {
            self.ran.lock().unwrap().push(hook.to_path_buf());
            if self.fail_on.as_deref() == Some(hook) {
                Ok(1)
            } else {
                Ok(0)
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        updater: ChrootUpdater,
        hooks_dir: PathBuf,
    }

    fn fixture(versions: &[u32]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let chroot_path = dir.path().join("chroot");
        let out_path = dir.path().join("out");
        fs::create_dir_all(chroot_path.join("etc")).unwrap();
        fs::create_dir_all(&out_path).unwrap();

        let hooks_dir = dir.path().join("hooks");
        fs::create_dir_all(&hooks_dir).unwrap();
        for v in versions {
            fs::write(hooks_dir.join(format!("{v}_migrate")), "#!/bin/sh\n").unwrap();
        }

        let chroot = Chroot::new(&chroot_path, &out_path).unwrap();
        Fixture {
            updater: ChrootUpdater::new(chroot, hooks_dir.clone()),
            hooks_dir,
            _dir: dir,
        }
    }

    #[test]
    fn hook_version_parsing() {
        assert_eq!(hook_version("10_add_user"), Some(10));
        assert_eq!(hook_version("0_bootstrap"), Some(0));
        assert_eq!(hook_version("README"), None);
        assert_eq!(hook_version("x_bad"), None);
    }

    #[test]
    fn missing_version_file_is_uninitialized() {
        let fx = fixture(&[1]);
        assert!(matches!(
            fx.updater.get_version(),
            Err(BurrowError::UninitializedChroot { .. })
        ));
        assert!(!fx.updater.is_initialized());
    }

    #[test]
    fn garbage_version_file_is_invalid() {
        let fx = fixture(&[1]);
        fs::write(fx.updater.chroot.version_file(), "banana").unwrap();
        assert!(matches!(
            fx.updater.get_version(),
            Err(BurrowError::InvalidChrootVersion { .. })
        ));
        assert!(!fx.updater.is_initialized());
    }

    #[test]
    fn version_roundtrip() {
        let fx = fixture(&[1]);
        fx.updater.set_version(7).unwrap();
        assert_eq!(fx.updater.get_version().unwrap(), 7);
        assert!(fx.updater.is_initialized());
    }

    #[test]
    fn zero_version_is_not_initialized() {
        let fx = fixture(&[1]);
        fx.updater.set_version(0).unwrap();
        assert!(!fx.updater.is_initialized());
    }

    #[test]
    fn missing_hooks_dir_means_no_upgrades() {
        let fx = fixture(&[]);
        fs::remove_dir(&fx.hooks_dir).unwrap();
        assert_eq!(fx.updater.latest_version().unwrap(), 0);

        fx.updater.set_version(1).unwrap();
        assert!(fx.updater.get_updates().unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_is_a_noop_without_hooks() {
        let fx = fixture(&[]);
        fs::remove_dir(&fx.hooks_dir).unwrap();
        fx.updater.set_version(1).unwrap();

        fx.updater.apply_updates(&FakeRunner::new()).await.unwrap();
        assert_eq!(fx.updater.get_version().unwrap(), 1);
    }

    #[test]
    fn duplicate_hooks_rejected() {
        let fx = fixture(&[9, 11]);
        fs::write(fx.hooks_dir.join("9_other"), "").unwrap();
        fx.updater.set_version(8).unwrap();
        assert!(matches!(
            fx.updater.get_updates(),
            Err(BurrowError::VersionHasMultipleHooks { version: 9, .. })
        ));
    }

    #[test]
    fn gap_in_hooks_is_deprecated() {
        let fx = fixture(&[9, 11]);
        fx.updater.set_version(8).unwrap();
        assert!(matches!(
            fx.updater.get_updates(),
            Err(BurrowError::ChrootDeprecated { version: 10, .. })
        ));
    }

    #[test]
    fn updates_ordered_ascending() {
        let fx = fixture(&[1, 2, 3, 4]);
        fx.updater.set_version(2).unwrap();
        let pending = fx.updater.get_updates().unwrap();
        let versions: Vec<u32> = pending.iter().map(|(v, _)| *v).collect();
        assert_eq!(versions, vec![3, 4]);
    }

    #[tokio::test]
    async fn apply_advances_to_latest() {
        let fx = fixture(&[1, 2, 3]);
        fx.updater.set_version(1).unwrap();

        let runner = FakeRunner::new();
        fx.updater.apply_updates(&runner).await.unwrap();

        assert_eq!(fx.updater.get_version().unwrap(), 3);
        assert_eq!(runner.ran.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn apply_stops_at_failed_hook() {
        let fx = fixture(&[1, 2, 3]);
        fx.updater.set_version(0).unwrap();
        let failing = fx.hooks_dir.join("2_migrate");

        let runner = FakeRunner::failing_on(failing);
        let err = fx.updater.apply_updates(&runner).await.unwrap_err();

        assert!(matches!(err, BurrowError::ChrootUpdate { version: 2, code: 1, .. }));
        // Version stays at the last success, never at or past the failure
        assert_eq!(fx.updater.get_version().unwrap(), 1);
        // Hook 3 never ran
        assert_eq!(runner.ran.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn apply_resumes_after_failure() {
        let fx = fixture(&[1, 2, 3]);
        fx.updater.set_version(1).unwrap();

        fx.updater.apply_updates(&FakeRunner::new()).await.unwrap();
        assert_eq!(fx.updater.get_version().unwrap(), 3);

        // Re-running with nothing pending is a no-op
        fx.updater.apply_updates(&FakeRunner::new()).await.unwrap();
        assert_eq!(fx.updater.get_version().unwrap(), 3);
    }

    #[tokio::test]
    async fn apply_rejects_too_new_chroot() {
        let fx = fixture(&[1, 2]);
        fx.updater.set_version(5).unwrap();

        let err = fx.updater.apply_updates(&FakeRunner::new()).await.unwrap_err();
        assert!(matches!(err, BurrowError::InvalidChrootVersion { .. }));
    }
}
