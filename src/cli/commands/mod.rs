//! CLI command implementations

pub mod cache;
pub mod create;
pub mod delete;
pub mod enter;
pub mod sdk;
pub mod update;

pub use cache::execute as cache;
pub use create::execute as create;
pub use delete::execute as delete;
pub use enter::execute as enter;
pub use sdk::execute as sdk;
pub use update::execute as update;

use crate::cache::TarballCache;
use crate::chroot::create::BuildUser;
use crate::chroot::Chroot;
use crate::config::{Config, ConfigManager};
use crate::error::{BurrowError, BurrowResult};
use crate::fetch::sdk::{SdkFetcher, SdkSelector};
use std::path::{Path, PathBuf};

/// Paths and identities shared by the chroot-facing commands
///
/// Resolved from config with checkout-relative defaults: the chroot
/// lives at `<source_root>/chroot`, persistent storage at
/// `<source_root>/out`, upgrade hooks under `<source_root>/sdk/hooks`.
pub(crate) struct CommandContext {
    pub chroot: Chroot,
    pub source_root: PathBuf,
    pub hooks_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub user: BuildUser,
}

impl CommandContext {
    pub fn resolve(config: &Config) -> BurrowResult<Self> {
        let source_root = match &config.chroot.source_root {
            Some(path) => path.clone(),
            None => std::env::current_dir()
                .map_err(|e| BurrowError::io("getting current directory", e))?,
        };

        let dir = config
            .chroot
            .dir
            .clone()
            .unwrap_or_else(|| source_root.join("chroot"));
        let out_dir = config
            .chroot
            .out_dir
            .clone()
            .unwrap_or_else(|| source_root.join("out"));
        let chroot = Chroot::new(dir, out_dir)?;

        let hooks_dir = config
            .chroot
            .hooks_dir
            .clone()
            .unwrap_or_else(|| source_root.join("sdk").join("hooks"));
        let cache_dir = config
            .cache
            .dir
            .clone()
            .unwrap_or_else(ConfigManager::default_cache_dir);

        let mut user = BuildUser::from_current()?;
        if let Some(name) = &config.chroot.user {
            user.name = name.clone();
        }

        Ok(Self {
            chroot,
            source_root,
            hooks_dir,
            cache_dir,
            user,
        })
    }
}

/// Board from the command line, falling back to the configured default
pub(crate) fn resolve_board(arg: Option<&str>, config: &Config) -> BurrowResult<String> {
    arg.map(str::to_string)
        .or_else(|| config.sdk.board.clone())
        .ok_or(BurrowError::BoardUnset)
}

/// Build an SDK fetcher over the configured cache root
pub(crate) fn sdk_fetcher(
    board: &str,
    ctx: &CommandContext,
    config: &Config,
) -> BurrowResult<SdkFetcher> {
    let cache = TarballCache::new(&ctx.cache_dir)?;
    Ok(SdkFetcher::new(
        board,
        config.fetch.base_url.as_str(),
        cache,
        config.fetch.retries,
        config.fetch.parallelism,
    ))
}

/// Turn the shared --version/--sdk-path flags into a selector
pub(crate) fn sdk_selector(version: Option<&str>, sdk_path: Option<&Path>) -> SdkSelector {
    match (sdk_path, version) {
        (Some(path), _) => SdkSelector::OverridePath(path.to_path_buf()),
        (None, Some(v)) => SdkSelector::Version(v.to_string()),
        (None, None) => SdkSelector::Default,
    }
}
