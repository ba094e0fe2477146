//! Sdk command - materialize SDK components into the cache

use crate::cli::args::SdkArgs;
use crate::cli::commands::{resolve_board, sdk_fetcher, sdk_selector, CommandContext};
use crate::config::Config;
use crate::error::BurrowResult;
use crate::fetch::sdk::{ActiveSdk, SdkComponent};

/// Execute the sdk command
pub async fn execute(args: SdkArgs, config: &Config) -> BurrowResult<()> {
    let ctx = CommandContext::resolve(config)?;
    let board = resolve_board(args.board.as_deref(), config)?;

    let fetcher = sdk_fetcher(&board, &ctx, config)?;
    let selector = sdk_selector(args.version.as_deref(), args.sdk_path.as_deref());
    let components = if args.components.is_empty() {
        SdkComponent::DEFAULT.to_vec()
    } else {
        args.components.clone()
    };

    let sdk = fetcher.prepare(selector, &components).await?;

    println!("SDK {}/{}", board, sdk.version());
    for (component, path) in sdk.paths() {
        println!("  {:<18} {}", component.name(), path.display());
    }

    ActiveSdk::record(&ctx.chroot.active_sdk_file(), board.as_str(), sdk.version())?;
    Ok(())
}
