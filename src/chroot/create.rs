//! Chroot creation
//!
//! Unpacks an SDK tarball and performs the one-time identity and
//! environment bootstrap that turns the raw image into a usable build
//! chroot. The steps are ordered; each is a precondition for the next.
//! Failures abort without rollback; the recovery path is delete and
//! retry, since `out_path` state is never destroyed here and home
//! directories are only populated when absent.

use crate::chroot::mount::{self, OUT_MOUNTS};
use crate::chroot::{BuildTarget, Chroot, SOURCE_MOUNT};
use crate::error::{BurrowError, BurrowResult};
use nix::unistd::{chown, Gid, Uid, User};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;
use tracing::{debug, info};

/// The primary build user inserted into the fresh chroot
#[derive(Debug, Clone)]
pub struct BuildUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

impl BuildUser {
    /// Derive the build user from the invoking (real) user
    pub fn from_current() -> BurrowResult<Self> {
        let uid = Uid::current();
        let user = User::from_uid(uid)
            .map_err(|e| BurrowError::io("resolving current user", e.into()))?
            .ok_or_else(|| BurrowError::Internal(format!("uid {uid} has no passwd entry")))?;
        Ok(Self {
            name: user.name,
            uid: uid.as_raw(),
            gid: user.gid.as_raw(),
        })
    }
}

/// Append a passwd entry, rejecting collisions with image accounts
pub(crate) fn add_passwd_entry(
    contents: &str,
    name: &str,
    uid: u32,
    gid: u32,
) -> BurrowResult<String> {
    if contents
        .lines()
        .any(|line| line.split(':').next() == Some(name))
    {
        return Err(BurrowError::UserCollision {
            name: name.to_string(),
        });
    }
    let mut out = contents.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("{name}:x:{uid}:{gid}::/home/{name}:/bin/bash\n"));
    Ok(out)
}

/// Append a group entry
///
/// A group of the same name with the same gid is a no-op (`None`);
/// groups are legitimately shared far more often than usernames.
pub(crate) fn add_group_entry(
    contents: &str,
    name: &str,
    gid: u32,
) -> BurrowResult<Option<String>> {
    for line in contents.lines() {
        let mut fields = line.split(':');
        if fields.next() != Some(name) {
            continue;
        }
        let existing: u32 = fields
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(u32::MAX);
        if existing == gid {
            return Ok(None);
        }
        return Err(BurrowError::GroupCollision {
            name: name.to_string(),
            existing,
            wanted: gid,
        });
    }
    let mut out = contents.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("{name}:x:{gid}:\n"));
    Ok(Some(out))
}

/// Creates and bootstraps a chroot from an SDK tarball
pub struct ChrootCreator {
    chroot: Chroot,
    target: BuildTarget,
    user: BuildUser,
}

impl ChrootCreator {
    pub fn new(chroot: Chroot, target: BuildTarget, user: BuildUser) -> Self {
        Self {
            chroot,
            target,
            user,
        }
    }

    /// Run the full creation sequence
    pub async fn create(&self, sdk_tarball: &Path) -> BurrowResult<()> {
        info!("Creating chroot at {}", self.chroot.path().display());
        self.extract_sdk(sdk_tarball).await?;
        self.init_timezone(Path::new("/etc/localtime"))?;
        self.init_user()?;
        self.init_group()?;
        self.init_etc()?;
        self.init_var()?;
        mount::mount_chroot_paths(&self.chroot, &self.target.build_root)?;
        self.run_env_update().await?;
        info!("Chroot created at {}", self.chroot.path().display());
        Ok(())
    }

    async fn extract_sdk(&self, tarball: &Path) -> BurrowResult<()> {
        let root = self.chroot.path();
        fs::create_dir_all(root)
            .map_err(|e| BurrowError::io(format!("creating {}", root.display()), e))?;
        debug!("Extracting {} into {}", tarball.display(), root.display());
        crate::exec::run_output(
            "tar",
            &[
                "-xpf".to_string(),
                tarball.display().to_string(),
                "-C".to_string(),
                root.display().to_string(),
            ],
            None,
            &HashMap::new(),
        )
        .await?;
        Ok(())
    }

    /// Replicate the host's localtime into the chroot, defaulting to UTC
    fn init_timezone(&self, host_localtime: &Path) -> BurrowResult<()> {
        let dest = self.chroot.path().join("etc/localtime");
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BurrowError::io("creating etc directory", e))?;
        }
        if dest.exists() || fs::symlink_metadata(&dest).is_ok() {
            fs::remove_file(&dest)
                .map_err(|e| BurrowError::io(format!("removing {}", dest.display()), e))?;
        }

        if let Ok(link) = fs::read_link(host_localtime) {
            symlink(&link, &dest)
                .map_err(|e| BurrowError::io(format!("linking {}", dest.display()), e))?;
        } else if host_localtime.is_file() {
            fs::copy(host_localtime, &dest)
                .map_err(|e| BurrowError::io(format!("copying {}", dest.display()), e))?;
        } else {
            symlink("/usr/share/zoneinfo/UTC", &dest)
                .map_err(|e| BurrowError::io(format!("linking {}", dest.display()), e))?;
        }
        Ok(())
    }

    fn init_user(&self) -> BurrowResult<()> {
        let passwd = self.chroot.path().join("etc/passwd");
        let contents = fs::read_to_string(&passwd).unwrap_or_default();
        let updated = add_passwd_entry(&contents, &self.user.name, self.user.uid, self.user.gid)?;
        fs::write(&passwd, updated)
            .map_err(|e| BurrowError::io(format!("writing {}", passwd.display()), e))?;

        // Re-entrant across re-extractions of the same persistent out_path
        let home = self.chroot.out_path().join("home").join(&self.user.name);
        if home.exists() {
            debug!("Home {} already populated, skipping", home.display());
            return Ok(());
        }
        fs::create_dir_all(&home)
            .map_err(|e| BurrowError::io(format!("creating {}", home.display()), e))?;
        chown(
            &home,
            Some(Uid::from_raw(self.user.uid)),
            Some(Gid::from_raw(self.user.gid)),
        )
        .map_err(|e| BurrowError::io(format!("chown {}", home.display()), e.into()))?;
        Ok(())
    }

    fn init_group(&self) -> BurrowResult<()> {
        let group = self.chroot.path().join("etc/group");
        let contents = fs::read_to_string(&group).unwrap_or_default();
        match add_group_entry(&contents, &self.user.name, self.user.gid)? {
            Some(updated) => fs::write(&group, updated)
                .map_err(|e| BurrowError::io(format!("writing {}", group.display()), e)),
            None => {
                debug!("Group {} already present with matching gid", self.user.name);
                Ok(())
            }
        }
    }

    fn init_etc(&self) -> BurrowResult<()> {
        let etc = self.chroot.path().join("etc");
        fs::create_dir_all(&etc).map_err(|e| BurrowError::io("creating etc", e))?;

        // mtab must reflect the live mount table
        let mtab = etc.join("mtab");
        let is_symlink = fs::symlink_metadata(&mtab)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_symlink {
            if mtab.exists() {
                fs::remove_file(&mtab)
                    .map_err(|e| BurrowError::io("removing stale mtab", e))?;
            }
            symlink("/proc/mounts", &mtab).map_err(|e| BurrowError::io("linking mtab", e))?;
        }

        for name in ["hosts", "resolv.conf"] {
            let host_file = Path::new("/etc").join(name);
            if host_file.is_file() {
                fs::copy(&host_file, etc.join(name))
                    .map_err(|e| BurrowError::io(format!("copying {name}"), e))?;
            }
        }

        let portage = etc.join("portage");
        fs::create_dir_all(&portage).map_err(|e| BurrowError::io("creating etc/portage", e))?;
        let mut make_conf = format!("BOARD_USE=\"{}\"\n", self.target.board);
        if let Some(profile) = &self.target.profile {
            make_conf.push_str(&format!("PROFILE_OVERRIDE=\"{profile}\"\n"));
        }
        fs::write(portage.join("make.conf.board"), make_conf)
            .map_err(|e| BurrowError::io("writing make.conf.board", e))?;

        let env_d = etc.join("env.d");
        fs::create_dir_all(&env_d).map_err(|e| BurrowError::io("creating etc/env.d", e))?;
        fs::write(
            env_d.join("99sdk"),
            format!("PATH=\"/usr/local/bin:/{SOURCE_MOUNT}/bin\"\nROOTPATH=\"/usr/local/bin\"\n"),
        )
        .map_err(|e| BurrowError::io("writing env.d entry", e))?;

        let profile_d = etc.join("profile.d");
        fs::create_dir_all(&profile_d).map_err(|e| BurrowError::io("creating profile.d", e))?;
        replace_symlink(
            &format!("/{SOURCE_MOUNT}/sdk/profile.sh"),
            &profile_d.join("50-sdk.sh"),
        )?;

        let completion_d = etc.join("bash_completion.d");
        fs::create_dir_all(&completion_d)
            .map_err(|e| BurrowError::io("creating bash_completion.d", e))?;
        replace_symlink(
            &format!("/{SOURCE_MOUNT}/sdk/completion.bash"),
            &completion_d.join("sdk"),
        )?;

        let sudoers_d = etc.join("sudoers.d");
        fs::create_dir_all(&sudoers_d).map_err(|e| BurrowError::io("creating sudoers.d", e))?;
        let sudoers = sudoers_d.join("90_sdk");
        fs::write(
            &sudoers,
            format!(
                "Defaults env_keep += \"http_proxy https_proxy no_proxy\"\n{} ALL=NOPASSWD: ALL\n",
                self.user.name
            ),
        )
        .map_err(|e| BurrowError::io("writing sudoers allowlist", e))?;
        fs::set_permissions(&sudoers, fs::Permissions::from_mode(0o440))
            .map_err(|e| BurrowError::io("chmod sudoers allowlist", e))?;

        Ok(())
    }

    /// Move image-shipped cache/log state out to persistent storage
    ///
    /// Future re-extractions then cannot clobber accumulated state, since
    /// the bind mounts put `out_path` back over these trees.
    fn init_var(&self) -> BurrowResult<()> {
        for (var_sub, out_sub) in [("var/cache", "cache"), ("var/log", "logs")] {
            let src = self.chroot.path().join(var_sub);
            let dst = self.chroot.out_path().join(out_sub);
            fs::create_dir_all(&dst)
                .map_err(|e| BurrowError::io(format!("creating {}", dst.display()), e))?;

            if !src.is_dir() {
                continue;
            }
            let entries = fs::read_dir(&src)
                .map_err(|e| BurrowError::io(format!("listing {}", src.display()), e))?;
            for entry in entries {
                let entry = entry.map_err(|e| BurrowError::io("reading var entry", e))?;
                let target = dst.join(entry.file_name());
                if target.exists() {
                    continue;
                }
                fs::rename(entry.path(), &target).map_err(|e| {
                    BurrowError::io(
                        format!("moving {} to {}", entry.path().display(), target.display()),
                        e,
                    )
                })?;
            }

            chown(
                &dst,
                Some(Uid::from_raw(self.user.uid)),
                Some(Gid::from_raw(self.user.gid)),
            )
            .map_err(|e| BurrowError::io(format!("chown {}", dst.display()), e.into()))?;
        }

        // Make sure every out-mount source exists before the mount pass
        for (out_sub, _, mode) in OUT_MOUNTS {
            let dir = self.chroot.out_path().join(out_sub);
            fs::create_dir_all(&dir)
                .map_err(|e| BurrowError::io(format!("creating {}", dir.display()), e))?;
            if let Some(mode) = mode {
                fs::set_permissions(&dir, fs::Permissions::from_mode(*mode))
                    .map_err(|e| BurrowError::io(format!("chmod {}", dir.display()), e))?;
            }
        }
        Ok(())
    }

    /// Regenerate environment-derived caches baked into the image
    async fn run_env_update(&self) -> BurrowResult<()> {
        let args = vec![
            "chroot".to_string(),
            self.chroot.path().display().to_string(),
            "env".to_string(),
            "PATH=/bin:/sbin:/usr/bin:/usr/sbin".to_string(),
            "env-update".to_string(),
        ];
        crate::exec::run_output("sudo", &args, None, &HashMap::new()).await?;
        Ok(())
    }
}

fn replace_symlink(target: &str, link: &Path) -> BurrowResult<()> {
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)
            .map_err(|e| BurrowError::io(format!("removing {}", link.display()), e))?;
    }
    symlink(target, link).map_err(|e| BurrowError::io(format!("linking {}", link.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const IMAGE_PASSWD: &str = "root:x:0:0:root:/root:/bin/bash\nportage:x:250:250::/var/tmp:/bin/false\n";
    const IMAGE_GROUP: &str = "root:x:0:\nusers:x:100:\n";

    #[test]
    fn passwd_entry_appended() {
        let out = add_passwd_entry(IMAGE_PASSWD, "dev", 1000, 1000).unwrap();
        assert!(out.ends_with("dev:x:1000:1000::/home/dev:/bin/bash\n"));
        assert!(out.starts_with(IMAGE_PASSWD));
    }

    #[test]
    fn passwd_collision_rejected() {
        let err = add_passwd_entry(IMAGE_PASSWD, "portage", 1000, 1000).unwrap_err();
        assert!(matches!(err, BurrowError::UserCollision { .. }));
    }

    #[test]
    fn group_entry_appended() {
        let out = add_group_entry(IMAGE_GROUP, "dev", 1000).unwrap().unwrap();
        assert!(out.ends_with("dev:x:1000:\n"));
    }

    #[test]
    fn group_same_gid_is_noop() {
        assert!(add_group_entry(IMAGE_GROUP, "users", 100).unwrap().is_none());
    }

    #[test]
    fn group_different_gid_rejected() {
        let err = add_group_entry(IMAGE_GROUP, "users", 1000).unwrap_err();
        assert!(matches!(
            err,
            BurrowError::GroupCollision {
                existing: 100,
                wanted: 1000,
                ..
            }
        ));
    }

    #[test]
    fn passwd_entry_handles_missing_trailing_newline() {
        let out = add_passwd_entry("root:x:0:0:root:/root:/bin/bash", "dev", 1, 1).unwrap();
        assert_eq!(out.lines().count(), 2);
    }

    fn creator(dir: &TempDir) -> ChrootCreator {
        let chroot = Chroot::new(dir.path().join("chroot"), dir.path().join("out")).unwrap();
        fs::create_dir_all(chroot.path().join("etc")).unwrap();
        fs::create_dir_all(chroot.out_path()).unwrap();
        let user = BuildUser {
            name: "dev".to_string(),
            uid: Uid::current().as_raw(),
            gid: Gid::current().as_raw(),
        };
        ChrootCreator::new(chroot, BuildTarget::new("board-x", dir.path().join("src")), user)
    }

    #[test]
    fn home_population_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let c = creator(&dir);
        fs::write(c.chroot.path().join("etc/passwd"), "").unwrap();

        c.init_user().unwrap();
        let home = c.chroot.out_path().join("home/dev");
        let marker = home.join("keep");
        fs::write(&marker, b"precious").unwrap();

        // Second bootstrap must not clobber the populated home; the user
        // entry itself collides as expected
        assert!(matches!(
            c.init_user(),
            Err(BurrowError::UserCollision { .. })
        ));
        fs::write(c.chroot.path().join("etc/passwd"), "").unwrap();
        c.init_user().unwrap();
        assert_eq!(fs::read(&marker).unwrap(), b"precious");
    }

    #[test]
    fn timezone_falls_back_to_utc() {
        let dir = TempDir::new().unwrap();
        let c = creator(&dir);
        c.init_timezone(&dir.path().join("no-such-localtime")).unwrap();

        let link = fs::read_link(c.chroot.path().join("etc/localtime")).unwrap();
        assert_eq!(link, PathBuf::from("/usr/share/zoneinfo/UTC"));
    }

    #[test]
    fn timezone_replicates_host_symlink() {
        let dir = TempDir::new().unwrap();
        let c = creator(&dir);
        let host = dir.path().join("localtime");
        symlink("/usr/share/zoneinfo/UTC0", &host).unwrap();

        c.init_timezone(&host).unwrap();
        let link = fs::read_link(c.chroot.path().join("etc/localtime")).unwrap();
        assert_eq!(link, PathBuf::from("/usr/share/zoneinfo/UTC0"));
    }

    #[test]
    fn etc_bootstrap_writes_expected_files() {
        let dir = TempDir::new().unwrap();
        let c = creator(&dir);
        c.init_etc().unwrap();

        let etc = c.chroot.path().join("etc");
        assert_eq!(
            fs::read_link(etc.join("mtab")).unwrap(),
            PathBuf::from("/proc/mounts")
        );
        let make_conf = fs::read_to_string(etc.join("portage/make.conf.board")).unwrap();
        assert!(make_conf.contains("board-x"));
        let sudoers = fs::read_to_string(etc.join("sudoers.d/90_sdk")).unwrap();
        assert!(sudoers.contains("dev ALL=NOPASSWD: ALL"));
        assert!(etc.join("env.d/99sdk").is_file());
    }

    #[test]
    fn var_migration_preserves_existing_out_state() {
        let dir = TempDir::new().unwrap();
        let c = creator(&dir);

        let image_cache = c.chroot.path().join("var/cache");
        fs::create_dir_all(image_cache.join("distfiles")).unwrap();
        fs::write(image_cache.join("distfiles/pkg.tar"), b"image").unwrap();

        let out_cache = c.chroot.out_path().join("cache");
        fs::create_dir_all(out_cache.join("distfiles")).unwrap();
        fs::write(out_cache.join("distfiles/old.tar"), b"kept").unwrap();

        c.init_var().unwrap();

        // pre-existing out state wins; image copy stays behind untouched
        assert!(out_cache.join("distfiles/old.tar").is_file());
        assert!(image_cache.join("distfiles/pkg.tar").is_file());
    }

    #[test]
    fn var_migration_moves_fresh_state() {
        let dir = TempDir::new().unwrap();
        let c = creator(&dir);

        fs::create_dir_all(c.chroot.path().join("var/log")).unwrap();
        fs::write(c.chroot.path().join("var/log/emerge.log"), b"log").unwrap();

        c.init_var().unwrap();
        assert!(c.chroot.out_path().join("logs/emerge.log").is_file());
        assert!(!c.chroot.path().join("var/log/emerge.log").exists());
    }
}
