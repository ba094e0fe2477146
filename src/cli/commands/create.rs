//! Create command - bootstrap a chroot from an SDK tarball

use crate::chroot::create::ChrootCreator;
use crate::chroot::version::ChrootUpdater;
use crate::chroot::{ensure_outside_chroot, BuildTarget};
use crate::cli::args::CreateArgs;
use crate::cli::commands::{resolve_board, sdk_fetcher, sdk_selector, CommandContext};
use crate::config::Config;
use crate::error::{BurrowError, BurrowResult};
use crate::fetch::sdk::ActiveSdk;
use console::style;
use tracing::info;

/// Execute the create command
pub async fn execute(args: CreateArgs, config: &Config) -> BurrowResult<()> {
    ensure_outside_chroot()?;
    let ctx = CommandContext::resolve(config)?;
    let board = resolve_board(args.board.as_deref(), config)?;

    if ctx.chroot.version_file().exists() {
        if !args.replace {
            return Err(BurrowError::ChrootInvalid(format!(
                "chroot already exists at {}; pass --replace or run: burrow delete",
                ctx.chroot.path().display()
            )));
        }
        super::delete::remove_chroot(&ctx.chroot).await?;
    }

    let fetcher = sdk_fetcher(&board, &ctx, config)?;
    let selector = sdk_selector(args.version.as_deref(), args.sdk_path.as_deref());

    // The reference stays pinned until the end of this function, so an
    // eviction sweep cannot remove the tarball mid-extract.
    let (version, base) = fetcher.fetch_base(selector).await?;
    info!("Using SDK {}/{}", board, version);

    let target = BuildTarget::new(board.clone(), ctx.source_root.clone());
    let creator = ChrootCreator::new(ctx.chroot.clone(), target, ctx.user.clone());
    creator.create(base.path()).await?;

    // Fresh chroots start at the latest version; hooks only exist to
    // carry old chroots forward. Version 0 means uninitialized, so a
    // checkout with no hooks still stamps 1.
    let updater = ChrootUpdater::new(ctx.chroot.clone(), ctx.hooks_dir.clone());
    let latest = updater.latest_version()?.max(1);
    updater.set_version(latest)?;

    ActiveSdk::record(&ctx.chroot.active_sdk_file(), board.as_str(), version.as_str())?;

    println!(
        "{} Chroot created at {} (version {})",
        style("✓").green(),
        ctx.chroot.path().display(),
        latest
    );
    println!("Enter it with: burrow enter");
    Ok(())
}
