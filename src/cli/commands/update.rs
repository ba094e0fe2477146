//! Update command - apply pending chroot upgrade hooks

use crate::chroot::ensure_outside_chroot;
use crate::chroot::version::{ChrootHookRunner, ChrootUpdater};
use crate::cli::commands::CommandContext;
use crate::config::Config;
use crate::error::{BurrowError, BurrowResult};
use console::style;

/// Execute the update command
pub async fn execute(config: &Config) -> BurrowResult<()> {
    ensure_outside_chroot()?;
    let ctx = CommandContext::resolve(config)?;

    let updater = ChrootUpdater::new(ctx.chroot.clone(), ctx.hooks_dir.clone());
    if !updater.is_initialized() {
        return Err(BurrowError::UninitializedChroot {
            path: ctx.chroot.path().to_path_buf(),
            version_file: ctx.chroot.version_file(),
        });
    }

    let before = updater.get_version()?;
    updater.apply_updates(&ChrootHookRunner).await?;
    let after = updater.get_version()?;

    if after == before {
        println!("Chroot already at version {after}");
    } else {
        println!(
            "{} Upgraded chroot from version {} to {}",
            style("✓").green(),
            before,
            after
        );
    }
    Ok(())
}
